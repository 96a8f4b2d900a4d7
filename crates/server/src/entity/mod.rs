pub mod oauth2_client;
pub mod oauth2_code;
pub mod oauth2_session;
pub mod user_token;
