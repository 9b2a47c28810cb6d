//! Database operations for the comments tables.

use sqlx::{PgPool, Row};
use threadline_engine::{Author, Entity, EntityId, ThreadRef, UserId};

/// A stored comment row from the database.
#[derive(Debug, Clone)]
pub struct StoredComment {
    pub id: i64,
    pub res_model: String,
    pub res_id: i64,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub author_name: String,
    pub content: String,
    pub like_count: i32,
    pub child_count: i32,
    pub created_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredComment {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredComment {
            id: row.try_get("id")?,
            res_model: row.try_get("res_model")?,
            res_id: row.try_get("res_id")?,
            parent_id: row.try_get("parent_id")?,
            author_id: row.try_get("author_id")?,
            author_name: row.try_get("author_name")?,
            content: row.try_get("content")?,
            like_count: row.try_get("like_count")?,
            child_count: row.try_get("child_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl StoredComment {
    pub fn thread(&self) -> ThreadRef {
        ThreadRef::new(self.res_model.clone(), self.res_id)
    }

    /// Convert database row to the engine's entity shape.
    pub fn to_entity(&self) -> Entity {
        let mut entity = Entity::new(
            self.id,
            self.content.clone(),
            u64::try_from(self.created_at).unwrap_or_default(),
        )
        .with_author(Author::new(self.author_id, self.author_name.clone()))
        .with_likes(u32::try_from(self.like_count).unwrap_or_default());
        entity.child_count = u32::try_from(self.child_count).unwrap_or_default();
        entity.parent_id = self.parent_id;
        entity
    }
}

/// Fields of a comment about to be inserted.
#[derive(Debug)]
pub struct NewComment<'a> {
    pub thread: &'a ThreadRef,
    pub parent_id: Option<EntityId>,
    pub author: &'a Author,
    pub content: &'a str,
    pub created_at: i64,
}

const COLUMNS: &str = "id, res_model, res_id, parent_id, author_id, author_name, \
                       content, like_count, child_count, created_at";

/// Insert a comment and return the stored row.
pub async fn insert_comment(
    pool: &PgPool,
    comment: NewComment<'_>,
) -> Result<StoredComment, sqlx::Error> {
    sqlx::query_as::<_, StoredComment>(&format!(
        r#"
        INSERT INTO comments (
            res_model, res_id, parent_id, author_id, author_name, content, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&comment.thread.res_model)
    .bind(comment.thread.res_id)
    .bind(comment.parent_id)
    .bind(comment.author.id)
    .bind(&comment.author.name)
    .bind(comment.content)
    .bind(comment.created_at)
    .fetch_one(pool)
    .await
}

/// Get a comment by id.
pub async fn get_comment(pool: &PgPool, id: EntityId) -> Result<Option<StoredComment>, sqlx::Error> {
    sqlx::query_as::<_, StoredComment>(&format!("SELECT {COLUMNS} FROM comments WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Replace a comment's content.
pub async fn update_content(
    pool: &PgPool,
    id: EntityId,
    content: &str,
) -> Result<Option<StoredComment>, sqlx::Error> {
    sqlx::query_as::<_, StoredComment>(&format!(
        "UPDATE comments SET content = $2 WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(content)
    .fetch_optional(pool)
    .await
}

/// Delete a comment; replies go with it through the foreign key cascade.
pub async fn delete_comment(pool: &PgPool, id: EntityId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Recount a parent's direct replies and store the result.
pub async fn refresh_child_count(pool: &PgPool, parent_id: EntityId) -> Result<i32, sqlx::Error> {
    let result: Option<(i32,)> = sqlx::query_as(
        r#"
        UPDATE comments
        SET child_count = (SELECT COUNT(*) FROM comments WHERE parent_id = $1)::INTEGER
        WHERE id = $1
        RETURNING child_count
        "#,
    )
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;

    Ok(result.map(|r| r.0).unwrap_or_default())
}

/// Flip `user_id`'s like on a comment.
///
/// Returns the new like count and whether the user now likes the comment.
/// The insert never conflicts, so concurrent toggles by the same user each
/// flip the like instead of failing on the primary key.
pub async fn toggle_like(
    pool: &PgPool,
    comment_id: EntityId,
    user_id: UserId,
) -> Result<(i32, bool), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(INSERT_LIKE)
        .bind(comment_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
        > 0;

    if !inserted {
        sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
            .bind(comment_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    let (count,): (i32,) = sqlx::query_as(
        r#"
        UPDATE comments
        SET like_count = (SELECT COUNT(*) FROM comment_likes WHERE comment_id = $1)::INTEGER
        WHERE id = $1
        RETURNING like_count
        "#,
    )
    .bind(comment_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((count, inserted))
}

const INSERT_LIKE: &str = "INSERT INTO comment_likes (comment_id, user_id) VALUES ($1, $2) \
                           ON CONFLICT (comment_id, user_id) DO NOTHING";

/// One page of a thread's top-level comments, most liked first.
pub async fn list_top_level(
    pool: &PgPool,
    thread: &ThreadRef,
    limit: i64,
    offset: i64,
) -> Result<Vec<StoredComment>, sqlx::Error> {
    sqlx::query_as::<_, StoredComment>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM comments
        WHERE res_model = $1 AND res_id = $2 AND parent_id IS NULL
        ORDER BY like_count DESC, created_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(&thread.res_model)
    .bind(thread.res_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Number of top-level comments in a thread.
pub async fn count_top_level(pool: &PgPool, thread: &ThreadRef) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM comments WHERE res_model = $1 AND res_id = $2 AND parent_id IS NULL",
    )
    .bind(&thread.res_model)
    .bind(thread.res_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// One page of a comment's direct replies, newest first.
pub async fn list_replies(
    pool: &PgPool,
    parent_id: EntityId,
    limit: i64,
    offset: i64,
) -> Result<Vec<StoredComment>, sqlx::Error> {
    sqlx::query_as::<_, StoredComment>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM comments
        WHERE parent_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(parent_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Number of direct replies to a comment.
pub async fn count_replies(pool: &PgPool, parent_id: EntityId) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments WHERE parent_id = $1")
        .bind(parent_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Reserved words stored in the database.
pub async fn get_reserved_words(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT word FROM reserved_words ORDER BY word")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(word,)| word).collect())
}
