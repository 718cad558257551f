use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Subject)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Users::PasswordHash))
                    .col(string_null(Users::Email))
                    .col(string(Users::Roles))
                    .col(big_integer(Users::CreatedAt))
                    .col(
                        ColumnDef::new(Users::Enabled)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        // Create sessions table
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::SessionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Sessions::Subject))
                    .col(big_integer(Sessions::CreatedAt))
                    .col(big_integer(Sessions::ExpiresAt))
                    .col(string_null(Sessions::UserAgent))
                    .to_owned(),
            )
            .await?;

        // Create roles table
        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Roles::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Roles::DisplayName))
                    .col(big_integer(Roles::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create pages table
        manager
            .create_table(
                Table::create()
                    .table(Pages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Pages::PageId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Pages::Title))
                    .col(string(Pages::Permalink))
                    .col(big_integer(Pages::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create properties table
        manager
            .create_table(
                Table::create()
                    .table(Properties::Table)
                    .if_not_exists()
                    .col(string(Properties::Owner))
                    .col(string(Properties::Key))
                    .col(string(Properties::Value))
                    .col(big_integer(Properties::UpdatedAt))
                    .primary_key(Index::create().col(Properties::Owner).col(Properties::Key))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Properties::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Pages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Subject,
    Username,
    PasswordHash,
    Email,
    Roles,
    CreatedAt,
    Enabled,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    SessionId,
    Subject,
    CreatedAt,
    ExpiresAt,
    UserAgent,
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Name,
    DisplayName,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Pages {
    Table,
    PageId,
    Title,
    Permalink,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Properties {
    Table,
    Owner,
    Key,
    Value,
    UpdatedAt,
}
