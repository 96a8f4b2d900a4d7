//! Creates the broker tables:
//! - oauth2_client: Registered client applications
//! - oauth2_session: Pending authorize requests (one hour)
//! - oauth2_code: Authorization codes awaiting exchange (one hour)
//! - user_token: Hashed bearer tokens (seven days)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Client::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Client::Secret).string().not_null())
                    .col(ColumnDef::new(OAuth2Client::RedirectUri).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2Session::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Session::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Session::ClientId).string().not_null())
                    .col(ColumnDef::new(OAuth2Session::State).string().not_null())
                    .col(
                        ColumnDef::new(OAuth2Session::CallbackState)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2Session::CallbackUrl).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Session::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Session::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2Code::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Code::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Code::ClientId).string().not_null())
                    .col(ColumnDef::new(OAuth2Code::Email).string().not_null())
                    .col(
                        ColumnDef::new(OAuth2Code::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Code::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserToken::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserToken::Email).string().not_null())
                    .col(
                        ColumnDef::new(UserToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // The expiry sweep deletes by expires_at on every table.
        manager
            .create_index(
                Index::create()
                    .name("idx_oauth2_session_expires_at")
                    .table(OAuth2Session::Table)
                    .col(OAuth2Session::ExpiresAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_oauth2_code_expires_at")
                    .table(OAuth2Code::Table)
                    .col(OAuth2Code::ExpiresAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_user_token_expires_at")
                    .table(UserToken::Table)
                    .col(UserToken::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Code::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Session::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Client::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuth2Client {
    #[sea_orm(iden = "oauth2_client")]
    Table,
    Id,
    Secret,
    RedirectUri,
}

#[derive(DeriveIden)]
enum OAuth2Session {
    #[sea_orm(iden = "oauth2_session")]
    Table,
    Id,
    ClientId,
    State,
    CallbackState,
    CallbackUrl,
    CreatedAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum OAuth2Code {
    #[sea_orm(iden = "oauth2_code")]
    Table,
    Id,
    ClientId,
    Email,
    CreatedAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum UserToken {
    Table,
    Token,
    Email,
    CreatedAt,
    ExpiresAt,
}
