use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::pool::DbPool;
use crate::db::schema::chat_users;
use crate::error::PresenceError;

/// A chat user record, created on the user's first connection.
#[derive(Debug, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = chat_users)]
pub struct ChatUser {
    pub user_id: String,
    pub username: String,
    pub online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insertable form for creating a new chat user.
#[derive(Debug, Insertable)]
#[diesel(table_name = chat_users)]
pub struct NewChatUser<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Look up a user by id.
pub async fn find(pool: &DbPool, user_id: &str) -> Result<Option<ChatUser>, PresenceError> {
    let mut conn = pool.get().await?;

    let user = diesel_async::RunQueryDsl::get_result(
        chat_users::table
            .find(user_id)
            .select(ChatUser::as_select()),
        &mut conn,
    )
    .await
    .optional()?;

    Ok(user)
}

/// Insert a new user, already marked online.
pub async fn create(pool: &DbPool, username: &str, user_id: &str) -> Result<(), PresenceError> {
    let now = Utc::now();
    let mut conn = pool.get().await?;

    diesel_async::RunQueryDsl::execute(
        diesel::insert_into(chat_users::table).values(NewChatUser {
            user_id,
            username,
            online: true,
            created_at: now,
            updated_at: now,
        }),
        &mut conn,
    )
    .await?;

    Ok(())
}

/// Set the online flag. Returns `NotFound` if the user does not exist.
pub async fn set_online(pool: &DbPool, user_id: &str, online: bool) -> Result<(), PresenceError> {
    let mut conn = pool.get().await?;

    let updated = diesel_async::RunQueryDsl::execute(
        diesel::update(chat_users::table.find(user_id)).set((
            chat_users::online.eq(online),
            chat_users::updated_at.eq(Utc::now()),
        )),
        &mut conn,
    )
    .await?;

    if updated == 0 {
        return Err(PresenceError::Database(diesel::result::Error::NotFound));
    }

    Ok(())
}
