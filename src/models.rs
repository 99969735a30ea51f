use serde::{Deserialize, Serialize};

use crate::entities::{category, movie};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMovieRequest {
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    pub overview: String,
    pub release_date: String,
    #[serde(default)]
    pub category_ids: Vec<i32>,
    #[serde(default)]
    pub poster_base64: Option<String>,
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub adult: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryCoverRequest {
    pub category_id: i32,
    pub cover_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct RateMovieRequest {
    pub movie_id: i32,
    pub score: i32,
}

#[derive(Debug, Deserialize)]
pub struct UnrateMovieRequest {
    pub movie_id: i32,
}

#[derive(Debug, Serialize)]
pub struct MovieOut {
    pub id: i32,
    pub title: String,
    pub original_title: String,
    pub original_language: String,
    pub overview: String,
    pub release_date: String,
    pub popularity: f64,
    pub vote_average: f64,
    pub vote_count: i32,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub video: bool,
    pub adult: bool,
}

impl From<movie::Model> for MovieOut {
    fn from(m: movie::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            original_title: m.original_title,
            original_language: m.original_language,
            overview: m.overview,
            release_date: m.release_date,
            popularity: m.popularity,
            vote_average: m.vote_average,
            vote_count: m.vote_count,
            poster_path: m.poster_path,
            backdrop_path: m.backdrop_path,
            video: m.video,
            adult: m.adult,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryOut {
    pub id: i32,
    pub name: String,
    pub cover_url: Option<String>,
}

impl From<category::Model> for CategoryOut {
    fn from(c: category::Model) -> Self {
        Self { id: c.id, name: c.name, cover_url: c.cover_url }
    }
}

#[derive(Debug, Serialize)]
pub struct MovieDetailOut {
    #[serde(flatten)]
    pub movie: MovieOut,
    pub categories: Vec<CategoryOut>,
}
