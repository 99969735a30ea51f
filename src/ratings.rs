//! Rating writes and the derived movie aggregates.
//!
//! Every rating mutation recomputes the owning movie's vote count, vote
//! average and popularity inside the same transaction, so committed movie
//! rows are never out of step with their rating set.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};

use crate::{
    entities::{movie, rating},
    error::{AppError, AppResult},
};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

/// Fixed damping prior: popularity of a movie with few votes is pulled
/// toward zero no matter how high its average is.
const DAMPING_PRIOR: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovieAggregates {
    pub vote_count: i32,
    pub vote_average: f64,
    pub popularity: f64,
}

/// Recomputes the derived fields from a movie's full set of scores.
pub fn aggregate(scores: &[i32]) -> MovieAggregates {
    let vote_count = scores.len() as i32;
    let vote_average = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| *s as f64).sum::<f64>() / vote_count as f64
    };
    let popularity = (vote_average * vote_count as f64) / (vote_count as f64 + DAMPING_PRIOR);

    MovieAggregates { vote_count, vote_average, popularity }
}

/// Creates or overwrites the caller's rating for a movie, then recomputes
/// the movie's aggregates. Both writes commit together or not at all.
pub async fn submit(
    db: &DatabaseConnection,
    user_id: i32,
    movie_id: i32,
    score: i32,
) -> AppResult<MovieAggregates> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(AppError::Validation(format!(
            "score must be between {MIN_SCORE} and {MAX_SCORE}"
        )));
    }

    let txn = db.begin().await?;

    if movie::Entity::find_by_id(movie_id).one(&txn).await?.is_none() {
        return Err(AppError::NotFound("movie"));
    }

    let model = rating::ActiveModel {
        id: Default::default(),
        user_id: Set(user_id),
        movie_id: Set(movie_id),
        score: Set(score),
    };

    rating::Entity::insert(model)
        .on_conflict(
            sea_orm::sea_query::OnConflict::columns([
                rating::Column::UserId,
                rating::Column::MovieId,
            ])
            .update_columns([rating::Column::Score])
            .to_owned(),
        )
        .exec(&txn)
        .await?;

    let aggregates = recompute(&txn, movie_id).await?;
    txn.commit().await?;

    Ok(aggregates)
}

/// Deletes the caller's rating for a movie and recomputes the aggregates.
/// Reports NotFound when no such rating exists.
pub async fn remove(
    db: &DatabaseConnection,
    user_id: i32,
    movie_id: i32,
) -> AppResult<MovieAggregates> {
    let txn = db.begin().await?;

    let existing = rating::Entity::find()
        .filter(rating::Column::UserId.eq(user_id))
        .filter(rating::Column::MovieId.eq(movie_id))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("rating"))?;

    rating::Entity::delete_by_id(existing.id).exec(&txn).await?;

    let aggregates = recompute(&txn, movie_id).await?;
    txn.commit().await?;

    Ok(aggregates)
}

async fn recompute<C: ConnectionTrait>(conn: &C, movie_id: i32) -> AppResult<MovieAggregates> {
    let scores: Vec<i32> = rating::Entity::find()
        .filter(rating::Column::MovieId.eq(movie_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.score)
        .collect();

    let aggregates = aggregate(&scores);

    movie::ActiveModel {
        id: Set(movie_id),
        vote_count: Set(aggregates.vote_count),
        vote_average: Set(aggregates.vote_average),
        popularity: Set(aggregates.popularity),
        ..Default::default()
    }
    .update(conn)
    .await?;

    Ok(aggregates)
}

#[cfg(test)]
mod tests {
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};

    use super::*;
    use crate::entities::user;

    const EPS: f64 = 1e-9;

    #[test]
    fn empty_rating_set_zeroes_everything() {
        let agg = aggregate(&[]);
        assert_eq!(agg.vote_count, 0);
        assert_eq!(agg.vote_average, 0.0);
        assert_eq!(agg.popularity, 0.0);
    }

    #[test]
    fn average_is_the_arithmetic_mean() {
        let agg = aggregate(&[8, 6]);
        assert_eq!(agg.vote_count, 2);
        assert!((agg.vote_average - 7.0).abs() < EPS);
        assert!((agg.popularity - 14.0 / 12.0).abs() < EPS);
    }

    #[test]
    fn popularity_damps_small_samples() {
        let one_vote = aggregate(&[8]);
        assert!((one_vote.popularity - 8.0 / 11.0).abs() < EPS);

        let hundred_votes = aggregate(&vec![8; 100]);
        assert!((hundred_votes.popularity - 800.0 / 110.0).abs() < EPS);
    }

    #[test]
    fn popularity_grows_with_count_at_fixed_average() {
        let mut previous = aggregate(&[8]).popularity;
        for count in [2usize, 5, 20, 100, 1000] {
            let current = aggregate(&vec![8; count]).popularity;
            assert!(current > previous, "count {count} should beat the smaller sample");
            previous = current;
        }
    }

    async fn setup() -> DatabaseConnection {
        // A single pooled connection keeps every query on the same
        // in-memory database.
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn seed_user(db: &DatabaseConnection, email: &str, username: &str) -> i32 {
        let model = user::ActiveModel {
            id: Default::default(),
            email: Set(email.to_string()),
            username: Set(username.to_string()),
            password_hash: Set("salt$deadbeef".to_string()),
            first_name: Set(String::new()),
            last_name: Set(String::new()),
            is_active: Set(true),
            is_staff: Set(false),
            date_joined: Set(0),
        };
        user::Entity::insert(model).exec(db).await.unwrap().last_insert_id
    }

    async fn seed_movie(db: &DatabaseConnection, title: &str) -> i32 {
        let model = movie::ActiveModel {
            id: Default::default(),
            title: Set(title.to_string()),
            original_title: Set(title.to_string()),
            original_language: Set("en".to_string()),
            overview: Set("an overview".to_string()),
            release_date: Set("2024-05-01".to_string()),
            popularity: Set(0.0),
            vote_average: Set(0.0),
            vote_count: Set(0),
            poster_path: Set(None),
            backdrop_path: Set(None),
            video: Set(false),
            adult: Set(false),
        };
        movie::Entity::insert(model).exec(db).await.unwrap().last_insert_id
    }

    async fn stored_aggregates(db: &DatabaseConnection, movie_id: i32) -> (i32, f64, f64) {
        let m = movie::Entity::find_by_id(movie_id).one(db).await.unwrap().unwrap();
        (m.vote_count, m.vote_average, m.popularity)
    }

    async fn rating_rows(db: &DatabaseConnection, movie_id: i32) -> usize {
        rating::Entity::find()
            .filter(rating::Column::MovieId.eq(movie_id))
            .all(db)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn submit_persists_aggregates_on_the_movie() {
        let db = setup().await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;
        let bob = seed_user(&db, "bob@example.com", "bob").await;
        let movie_id = seed_movie(&db, "Heat").await;

        submit(&db, alice, movie_id, 8).await.unwrap();
        submit(&db, bob, movie_id, 6).await.unwrap();

        let (count, average, popularity) = stored_aggregates(&db, movie_id).await;
        assert_eq!(count, 2);
        assert!((average - 7.0).abs() < EPS);
        assert!((popularity - 14.0 / 12.0).abs() < EPS);
    }

    #[tokio::test]
    async fn resubmission_upserts_instead_of_duplicating() {
        let db = setup().await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;
        let movie_id = seed_movie(&db, "Heat").await;

        submit(&db, alice, movie_id, 8).await.unwrap();
        submit(&db, alice, movie_id, 4).await.unwrap();

        assert_eq!(rating_rows(&db, movie_id).await, 1);

        let (count, average, _) = stored_aggregates(&db, movie_id).await;
        assert_eq!(count, 1);
        assert!((average - 4.0).abs() < EPS);
    }

    #[tokio::test]
    async fn out_of_range_score_is_rejected_without_a_write() {
        let db = setup().await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;
        let movie_id = seed_movie(&db, "Heat").await;

        for bad in [0, 11, -3] {
            assert!(matches!(
                submit(&db, alice, movie_id, bad).await,
                Err(AppError::Validation(_))
            ));
        }

        assert_eq!(rating_rows(&db, movie_id).await, 0);
        let (count, average, popularity) = stored_aggregates(&db, movie_id).await;
        assert_eq!((count, average, popularity), (0, 0.0, 0.0));
    }

    #[tokio::test]
    async fn submitting_against_a_missing_movie_is_not_found() {
        let db = setup().await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;

        assert!(matches!(submit(&db, alice, 999, 5).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn removing_the_only_rating_resets_the_movie() {
        let db = setup().await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;
        let movie_id = seed_movie(&db, "Heat").await;

        submit(&db, alice, movie_id, 9).await.unwrap();
        remove(&db, alice, movie_id).await.unwrap();

        assert_eq!(rating_rows(&db, movie_id).await, 0);
        let (count, average, popularity) = stored_aggregates(&db, movie_id).await;
        assert_eq!((count, average, popularity), (0, 0.0, 0.0));
    }

    #[tokio::test]
    async fn removing_an_absent_rating_is_not_found() {
        let db = setup().await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;
        let movie_id = seed_movie(&db, "Heat").await;

        assert!(matches!(remove(&db, alice, movie_id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn removal_only_touches_the_callers_rating() {
        let db = setup().await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;
        let bob = seed_user(&db, "bob@example.com", "bob").await;
        let movie_id = seed_movie(&db, "Heat").await;

        submit(&db, alice, movie_id, 10).await.unwrap();
        submit(&db, bob, movie_id, 2).await.unwrap();
        remove(&db, alice, movie_id).await.unwrap();

        let (count, average, _) = stored_aggregates(&db, movie_id).await;
        assert_eq!(count, 1);
        assert!((average - 2.0).abs() < EPS);
    }
}
