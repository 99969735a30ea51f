use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    #[sea_orm(primary_key)]
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

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::rating::Entity")]
    Rating,
}

impl Related<super::rating::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rating.def()
    }
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        super::movie_category::Relation::Category.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::movie_category::Relation::Movie.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
