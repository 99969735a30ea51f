use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string(Users::Email))
                    .col(string(Users::Username))
                    .col(string(Users::PasswordHash))
                    .col(string(Users::FirstName).default(""))
                    .col(string(Users::LastName).default(""))
                    .col(boolean(Users::IsActive).default(true))
                    .col(boolean(Users::IsStaff).default(false))
                    .col(big_integer(Users::DateJoined))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_email_unique")
                    .table(Users::Table)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_username_unique")
                    .table(Users::Table)
                    .col(Users::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(pk_auto(Movies::Id))
                    .col(string(Movies::Title))
                    .col(string(Movies::OriginalTitle))
                    .col(string(Movies::OriginalLanguage).default("en"))
                    .col(text(Movies::Overview))
                    .col(string(Movies::ReleaseDate))
                    .col(double(Movies::Popularity).default(0.0))
                    .col(double(Movies::VoteAverage).default(0.0))
                    .col(integer(Movies::VoteCount).default(0))
                    .col(string_null(Movies::PosterPath))
                    .col(string_null(Movies::BackdropPath))
                    .col(boolean(Movies::Video).default(false))
                    .col(boolean(Movies::Adult).default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(pk_auto(Categories::Id))
                    .col(string(Categories::Name))
                    .col(string_null(Categories::CoverUrl))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_categories_name_unique")
                    .table(Categories::Table)
                    .col(Categories::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MovieCategories::Table)
                    .if_not_exists()
                    .col(integer(MovieCategories::MovieId))
                    .col(integer(MovieCategories::CategoryId))
                    .primary_key(
                        Index::create()
                            .col(MovieCategories::MovieId)
                            .col(MovieCategories::CategoryId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Ratings::Table)
                    .if_not_exists()
                    .col(pk_auto(Ratings::Id))
                    .col(integer(Ratings::UserId))
                    .col(integer(Ratings::MovieId))
                    .col(integer(Ratings::Score))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ratings_user_movie_unique")
                    .table(Ratings::Table)
                    .col(Ratings::UserId)
                    .col(Ratings::MovieId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ratings_movie")
                    .table(Ratings::Table)
                    .col(Ratings::MovieId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Ratings::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(MovieCategories::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Categories::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Username,
    PasswordHash,
    FirstName,
    LastName,
    IsActive,
    IsStaff,
    DateJoined,
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Id,
    Title,
    OriginalTitle,
    OriginalLanguage,
    Overview,
    ReleaseDate,
    Popularity,
    VoteAverage,
    VoteCount,
    PosterPath,
    BackdropPath,
    Video,
    Adult,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
    Name,
    CoverUrl,
}

#[derive(DeriveIden)]
enum MovieCategories {
    Table,
    MovieId,
    CategoryId,
}

#[derive(DeriveIden)]
enum Ratings {
    Table,
    Id,
    UserId,
    MovieId,
    Score,
}
