//! SeaORM Entity for properties table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a listing is offered for sale or for rent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(8))")]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "rent")]
    Rent,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "properties")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub price_cents: i64,
    pub listing_kind: ListingKind,
    pub address: String,
    pub city: String,
    pub bedrooms: i16,
    pub bathrooms: i16,
    pub area_sqm: Option<i32>,
    pub is_published: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::OwnerId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Owner,
    #[sea_orm(has_many = "super::property_images::Entity")]
    Images,
    #[sea_orm(has_many = "super::conversations::Entity")]
    Conversations,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::property_images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl Related<super::conversations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
