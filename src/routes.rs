use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde_json::json;

use crate::{
    AppState,
    auth::{self, AuthUser},
    cache::now_sec,
    entities::{category, movie, movie_category, user},
    error::{AppError, AppResult},
    images,
    models::{
        CategoryCoverRequest, CategoryOut, CreateCategoryRequest, CreateMovieRequest, LoginRequest,
        MovieDetailOut, MovieOut, RateMovieRequest, RefreshRequest, RegisterRequest, TokenResponse,
        UnrateMovieRequest,
    },
    ratings,
    throttle::ClientAddr,
};

const MOVIE_LIST_CACHE_KEY: &str = "movie_list";

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/token_refresh", post(token_refresh))
        .route("/movie_list", get(movie_list))
        .route("/movie_detail/{id}", get(movie_detail))
        .route("/movie_add", post(movie_add))
        .route("/category_list", get(category_list))
        .route("/category_create", post(category_create))
        .route("/category_cover", post(category_cover))
        .route("/movie_rate", post(movie_rate).delete(movie_unrate))
        .with_state(state)
}

fn token_response(tokens: auth::IssuedTokens) -> TokenResponse {
    TokenResponse {
        success: true,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        detail: None,
    }
}

fn unique_violation(err: sea_orm::DbErr, detail: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Validation(detail.to_string()),
        _ => err.into(),
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();

    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("email: a valid address is required".to_string()));
    }
    if username.is_empty() || !username.chars().all(|c| c.is_alphabetic()) {
        return Err(AppError::Validation("username: must contain only letters".to_string()));
    }
    if req.password.chars().count() < 8 {
        return Err(AppError::Validation(
            "password: must be at least 8 characters".to_string(),
        ));
    }

    let model = user::ActiveModel {
        id: Default::default(),
        email: Set(email),
        username: Set(username.clone()),
        password_hash: Set(auth::hash_password(&req.password)),
        first_name: Set(String::new()),
        last_name: Set(String::new()),
        is_active: Set(true),
        is_staff: Set(false),
        date_joined: Set(now_sec()),
    };

    let result = user::Entity::insert(model)
        .exec(&state.db)
        .await
        .map_err(|e| unique_violation(e, "email or username is already registered"))?;

    tracing::info!(username = %username, "user registered");

    let tokens = state.tokens.issue(result.last_insert_id);
    Ok((StatusCode::CREATED, Json(token_response(tokens))))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let account = user::Entity::find()
        .filter(user::Column::Email.eq(req.email.trim().to_lowercase()))
        .one(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !account.is_active || !auth::verify_password(&account.password_hash, &req.password) {
        return Err(AppError::Unauthorized);
    }

    let tokens = state.tokens.issue(account.id);
    Ok(Json(token_response(tokens)))
}

async fn token_refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let tokens = state.tokens.refresh(&req.refresh_token)?;
    Ok(Json(token_response(tokens)))
}

async fn movie_list(State(state): State<Arc<AppState>>, client: ClientAddr) -> AppResult<Response> {
    state.throttle.check(&client.0)?;

    let db = state.db.clone();
    let payload = state
        .cache
        .get_or_populate(MOVIE_LIST_CACHE_KEY, state.config.cache_ttl_seconds, move || async move {
            let movies = movie::Entity::find().order_by_asc(movie::Column::Id).all(&db).await?;
            let out: Vec<MovieOut> = movies.into_iter().map(MovieOut::from).collect();
            let payload = serde_json::to_string(&out).map_err(anyhow::Error::from)?;
            Ok::<_, AppError>(payload)
        })
        .await?;

    Ok(([(header::CONTENT_TYPE, "application/json")], payload).into_response())
}

async fn movie_detail(
    State(state): State<Arc<AppState>>,
    client: ClientAddr,
    Path(id): Path<i32>,
) -> AppResult<Json<MovieDetailOut>> {
    state.throttle.check(&client.0)?;

    let found = movie::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("movie"))?;

    let categories = found.find_related(category::Entity).all(&state.db).await?;

    Ok(Json(MovieDetailOut {
        movie: found.into(),
        categories: categories.into_iter().map(CategoryOut::from).collect(),
    }))
}

async fn movie_add(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(req): Json<CreateMovieRequest>,
) -> AppResult<impl IntoResponse> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::Validation("title: must not be empty".to_string()));
    }
    if req.overview.trim().is_empty() {
        return Err(AppError::Validation("overview: must not be empty".to_string()));
    }
    let release_date: jiff::civil::Date = req
        .release_date
        .parse()
        .map_err(|_| AppError::Validation("release_date: expected YYYY-MM-DD".to_string()))?;

    let poster = match &req.poster_base64 {
        Some(payload) => Some(images::decode_base64_image(payload)?),
        None => None,
    };

    let txn = state.db.begin().await?;

    for category_id in &req.category_ids {
        if category::Entity::find_by_id(*category_id).one(&txn).await?.is_none() {
            return Err(AppError::NotFound("category"));
        }
    }

    let model = movie::ActiveModel {
        id: Default::default(),
        title: Set(title.clone()),
        original_title: Set(req.original_title.unwrap_or_else(|| title.clone())),
        original_language: Set(req.original_language.unwrap_or_else(|| "en".to_string())),
        overview: Set(req.overview.trim().to_string()),
        release_date: Set(release_date.to_string()),
        popularity: Set(0.0),
        vote_average: Set(0.0),
        vote_count: Set(0),
        poster_path: Set(None),
        backdrop_path: Set(None),
        video: Set(req.video),
        adult: Set(req.adult),
    };
    let movie_id = movie::Entity::insert(model).exec(&txn).await?.last_insert_id;

    for category_id in req.category_ids {
        let link = movie_category::ActiveModel {
            movie_id: Set(movie_id),
            category_id: Set(category_id),
        };
        movie_category::Entity::insert(link).exec(&txn).await?;
    }

    // Upload before commit: a failed upload must take the movie row with it.
    if let Some(bytes) = poster {
        let url = state.images.upload(&bytes, &format!("movie-{movie_id}")).await?;
        movie::ActiveModel {
            id: Set(movie_id),
            poster_path: Set(Some(url)),
            ..Default::default()
        }
        .update(&txn)
        .await?;
    }

    txn.commit().await?;

    tracing::info!(movie_id = movie_id, title = %title, "movie created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "detail": "movie created successfully",
            "movie_id": movie_id,
        })),
    ))
}

async fn category_list(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<CategoryOut>>> {
    let categories = category::Entity::find()
        .order_by_asc(category::Column::Name)
        .all(&state.db)
        .await?;
    Ok(Json(categories.into_iter().map(CategoryOut::from).collect()))
}

async fn category_create(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(req): Json<CreateCategoryRequest>,
) -> AppResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("name: must not be empty".to_string()));
    }

    let model = category::ActiveModel {
        id: Default::default(),
        name: Set(name),
        cover_url: Set(None),
    };

    let result = category::Entity::insert(model)
        .exec(&state.db)
        .await
        .map_err(|e| unique_violation(e, "category name already exists"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "detail": "category created successfully",
            "category_id": result.last_insert_id,
        })),
    ))
}

async fn category_cover(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(req): Json<CategoryCoverRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let bytes = images::decode_base64_image(&req.cover_base64)?;

    let found = category::Entity::find_by_id(req.category_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("category"))?;

    let url = state.images.upload(&bytes, &format!("category-{}", found.id)).await?;

    category::ActiveModel {
        id: Set(found.id),
        cover_url: Set(Some(url)),
        ..Default::default()
    }
    .update(&state.db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "detail": "category cover uploaded successfully",
    })))
}

async fn movie_rate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<RateMovieRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let aggregates = ratings::submit(&state.db, user.user_id, req.movie_id, req.score).await?;

    Ok(Json(json!({
        "success": true,
        "detail": "rating saved",
        "vote_count": aggregates.vote_count,
        "vote_average": aggregates.vote_average,
        "popularity": aggregates.popularity,
    })))
}

async fn movie_unrate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<UnrateMovieRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let aggregates = ratings::remove(&state.db, user.user_id, req.movie_id).await?;

    Ok(Json(json!({
        "success": true,
        "detail": "rating removed",
        "vote_count": aggregates.vote_count,
        "vote_average": aggregates.vote_average,
        "popularity": aggregates.popularity,
    })))
}
