//! Registered client lookup and redirect URI matching.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use subtle::ConstantTimeEq;

use crate::cache::ClientCache;
use crate::entity::oauth2_client;
use crate::store::ClientRegistry;

/// A registered redirect URI pattern compiled to an anchored matcher.
///
/// Everything except `*` is literal; `*` matches any run of characters, including
/// none. The whole candidate must match, so `https://app.example.com/*` never
/// accepts a URI that merely contains that text.
#[derive(Clone, Debug)]
pub struct RedirectPattern {
    source: String,
    regex: Regex,
}

impl RedirectPattern {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(&format!("^{body}$"))?,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// A client with its redirect pattern compiled.
#[derive(Clone, Debug)]
pub struct RegisteredClient {
    pub id: String,
    secret: String,
    redirect: RedirectPattern,
}

impl RegisteredClient {
    pub fn new(id: &str, secret: &str, redirect_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            id: id.to_string(),
            secret: secret.to_string(),
            redirect: RedirectPattern::compile(redirect_pattern)?,
        })
    }

    pub fn match_redirect(&self, candidate: &str) -> bool {
        self.redirect.matches(candidate)
    }

    pub fn verify_secret(&self, provided: &str) -> bool {
        self.secret.as_bytes().ct_eq(provided.as_bytes()).into()
    }

    pub fn redirect_pattern(&self) -> &str {
        self.redirect.as_str()
    }
}

impl TryFrom<oauth2_client::Model> for RegisteredClient {
    type Error = regex::Error;

    fn try_from(model: oauth2_client::Model) -> Result<Self, Self::Error> {
        RegisteredClient::new(&model.id, &model.secret, &model.redirect_uri)
    }
}

/// Database-backed client registry. Clients are provisioned out of band and
/// rarely change, so lookups go through a [`ClientCache`].
#[derive(Clone)]
pub struct DbClientRegistry {
    db: Arc<DatabaseConnection>,
    cache: ClientCache,
}

impl DbClientRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            cache: ClientCache::default(),
        }
    }
}

#[async_trait]
impl ClientRegistry for DbClientRegistry {
    #[tracing::instrument(skip(self))]
    async fn lookup_client(
        &self,
        client_id: &str,
    ) -> Result<Option<Arc<RegisteredClient>>, DbErr> {
        if let Some(cached) = self.cache.get(client_id) {
            return Ok(cached);
        }

        let Some(model) = oauth2_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?
        else {
            self.cache.insert(client_id, None);
            return Ok(None);
        };

        match RegisteredClient::try_from(model) {
            Ok(client) => {
                let client = Arc::new(client);
                self.cache.insert(client_id, Some(client.clone()));
                Ok(Some(client))
            }
            Err(e) => {
                tracing::warn!(client_id, error = %e, "unusable redirect_uri pattern");
                self.cache.insert(client_id, None);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> RedirectPattern {
        RedirectPattern::compile(p).unwrap()
    }

    #[test]
    fn wildcard_matches_any_suffix() {
        let p = pattern("https://a.b/*");
        assert!(p.matches("https://a.b/x"));
        assert!(p.matches("https://a.b/"));
        assert!(p.matches("https://a.b/deep/path?q=1"));
    }

    #[test]
    fn match_is_anchored_to_the_whole_uri() {
        let p = pattern("https://a.b/*");
        assert!(!p.matches("https://evil.com/?x=https://a.b/"));
        assert!(!p.matches("http://a.b/x"));

        let p = pattern("https://app.example.com/*");
        assert!(p.matches("https://app.example.com/cb"));
        assert!(!p.matches("https://evil.com/https://app.example.com/cb"));
    }

    #[test]
    fn dots_are_literal() {
        let p = pattern("https://app.example.com/cb");
        assert!(p.matches("https://app.example.com/cb"));
        assert!(!p.matches("https://appXexample.com/cb"));
        assert!(!p.matches("https://app.example.com/cb/extra"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = pattern("https://a.b/cb?next=(x)+");
        assert!(p.matches("https://a.b/cb?next=(x)+"));
        assert!(!p.matches("https://a.b/cbnext=xx"));
    }

    #[test]
    fn wildcard_in_host_segment() {
        let p = pattern("https://*.example.com/cb");
        assert!(p.matches("https://tenant.example.com/cb"));
        assert!(!p.matches("https://tenant.example.org/cb"));
    }

    #[test]
    fn secret_comparison_is_exact() {
        let client = RegisteredClient::new("c1", "s3cret", "https://a.b/*").unwrap();
        assert!(client.verify_secret("s3cret"));
        assert!(!client.verify_secret("s3cre"));
        assert!(!client.verify_secret("s3cret "));
        assert!(!client.verify_secret(""));
    }
}
