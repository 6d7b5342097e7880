use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager, ManagerConfig,
    },
    scoped_futures::ScopedFutureExt,
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use inbox_types::{Attachment, Course, MessageItem, MessageResponse};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{NewAttachment, NewMessage, UserRow};

pub type DbPool = Pool<AsyncPgConnection>;
pub type DbConnection = Object<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

/// Build the connection pool. Connections are opened lazily on first checkout.
pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config)
        .max_size(10)
        .build()
        .context("Failed to create database pool")?;

    Ok(pool)
}

pub async fn get_conn(pool: &DbPool) -> anyhow::Result<DbConnection> {
    pool.get().await.context("Failed to get DB connection")
}

pub mod users {
    use super::*;

    /// Users that completed the OAuth flow with offline access.
    pub async fn list_with_refresh_token(
        conn: &mut AsyncPgConnection,
    ) -> anyhow::Result<Vec<UserRow>> {
        use crate::schema::users::dsl::*;

        let rows = users
            .filter(refresh_token.is_not_null())
            .order_by(created_at.asc())
            .select(UserRow::as_select())
            .load(conn)
            .await?;

        Ok(rows)
    }

    /// Most recently connected user that can act on Google APIs offline.
    pub async fn latest_with_refresh_token(
        conn: &mut AsyncPgConnection,
    ) -> anyhow::Result<Option<UserRow>> {
        use crate::schema::users::dsl::*;

        let row = users
            .filter(refresh_token.is_not_null())
            .order_by(updated_at.desc())
            .select(UserRow::as_select())
            .first(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Create or update a user from an OAuth callback.
    ///
    /// A missing refresh token keeps the one already stored, since Google
    /// only issues it on the first consent.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_with_tokens(
        conn: &mut AsyncPgConnection,
        google_id_val: Option<&str>,
        email_val: &str,
        display_name_val: Option<&str>,
        access_token_val: &str,
        refresh_token_val: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<UserRow> {
        use crate::schema::users::dsl::*;

        let insert = diesel::insert_into(users).values((
            google_id.eq(google_id_val),
            email.eq(email_val),
            display_name.eq(display_name_val),
            access_token.eq(Some(access_token_val)),
            refresh_token.eq(refresh_token_val),
            token_expires_at.eq(expires_at),
        ));

        let row = match refresh_token_val {
            Some(refresh) => {
                insert
                    .on_conflict(email)
                    .do_update()
                    .set((
                        google_id.eq(google_id_val),
                        display_name.eq(display_name_val),
                        access_token.eq(Some(access_token_val)),
                        refresh_token.eq(Some(refresh)),
                        token_expires_at.eq(expires_at),
                        updated_at.eq(Utc::now()),
                    ))
                    .returning(UserRow::as_returning())
                    .get_result(conn)
                    .await?
            }
            None => {
                insert
                    .on_conflict(email)
                    .do_update()
                    .set((
                        google_id.eq(google_id_val),
                        display_name.eq(display_name_val),
                        access_token.eq(Some(access_token_val)),
                        token_expires_at.eq(expires_at),
                        updated_at.eq(Utc::now()),
                    ))
                    .returning(UserRow::as_returning())
                    .get_result(conn)
                    .await?
            }
        };

        Ok(row)
    }

    pub async fn update_access_token(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        access_token_val: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set((
                access_token.eq(Some(access_token_val)),
                token_expires_at.eq(Some(expires_at)),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }
}

pub mod courses {
    use super::*;

    pub async fn list_all(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<Course>> {
        use crate::schema::courses::dsl::*;

        let rows = courses.order_by(name.asc()).load::<Course>(conn).await?;

        Ok(rows)
    }

    /// Insert a Classroom course, or rename it if it is already known.
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        course_id_val: &str,
        name_val: &str,
    ) -> anyhow::Result<Course> {
        use crate::schema::courses::dsl::*;

        let course = diesel::insert_into(courses)
            .values((course_id.eq(course_id_val), name.eq(name_val)))
            .on_conflict(course_id)
            .do_update()
            .set(name.eq(name_val))
            .get_result::<Course>(conn)
            .await?;

        Ok(course)
    }
}

pub mod messages {
    use super::*;

    pub async fn list_recent(
        conn: &mut AsyncPgConnection,
        limit: i64,
    ) -> anyhow::Result<Vec<MessageItem>> {
        use crate::schema::messages::dsl::*;

        let rows = messages
            .order_by(created_at.desc())
            .limit(limit)
            .load::<MessageItem>(conn)
            .await?;

        Ok(rows)
    }

    /// Items due at or after `after`, soonest first.
    pub async fn list_upcoming(
        conn: &mut AsyncPgConnection,
        after: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<MessageItem>> {
        use crate::schema::messages::dsl::*;

        let rows = messages
            .filter(due_datetime.ge(after))
            .order_by(due_datetime.asc())
            .limit(limit)
            .load::<MessageItem>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        message_id: Uuid,
    ) -> anyhow::Result<Option<MessageItem>> {
        use crate::schema::messages::dsl::*;

        let row = messages
            .filter(id.eq(message_id))
            .first::<MessageItem>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Insert an item. Returns `None` when `(source, external_id)` already exists.
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_message: NewMessage,
    ) -> anyhow::Result<Option<MessageItem>> {
        use crate::schema::messages::dsl::*;

        let row = diesel::insert_into(messages)
            .values(&new_message)
            .on_conflict((source, external_id))
            .do_nothing()
            .get_result::<MessageItem>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Insert an item and its attachments in one transaction.
    ///
    /// Returns `None` when the item already exists; nothing is written then.
    pub async fn insert_with_attachments<F>(
        conn: &mut AsyncPgConnection,
        new_message: NewMessage,
        make_attachments: F,
    ) -> anyhow::Result<Option<MessageResponse>>
    where
        F: FnOnce(Uuid) -> Vec<NewAttachment> + Send,
    {
        let external_id = new_message.external_id.clone();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let Some(item) = insert(conn, new_message).await? else {
                    return Ok(None);
                };
                let files = attachments::insert_many(conn, make_attachments(item.id)).await?;
                Ok(Some(MessageResponse::with_attachments(item, files)))
            }
            .scope_boxed()
        })
        .await
        .with_context(|| format!("Failed to save item {}", external_id))
    }

    /// Attach attachment rows to each item, preserving the input order.
    pub async fn with_attachments(
        conn: &mut AsyncPgConnection,
        items: Vec<MessageItem>,
    ) -> anyhow::Result<Vec<MessageResponse>> {
        let ids: Vec<Uuid> = items.iter().map(|m| m.id).collect();
        let mut grouped = attachments::list_for_messages(conn, &ids).await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let files = grouped.remove(&item.id).unwrap_or_default();
                MessageResponse::with_attachments(item, files)
            })
            .collect())
    }
}

pub mod attachments {
    use super::*;

    pub async fn insert_many(
        conn: &mut AsyncPgConnection,
        new_attachments: Vec<NewAttachment>,
    ) -> anyhow::Result<Vec<Attachment>> {
        use crate::schema::attachments::dsl::*;

        if new_attachments.is_empty() {
            return Ok(Vec::new());
        }

        let rows = diesel::insert_into(attachments)
            .values(&new_attachments)
            .get_results::<Attachment>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn list_for_messages(
        conn: &mut AsyncPgConnection,
        message_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, Vec<Attachment>>> {
        use crate::schema::attachments::dsl::*;

        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = attachments
            .filter(message_id.eq_any(message_ids))
            .order_by(name.asc())
            .load::<Attachment>(conn)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
        for row in rows {
            grouped.entry(row.message_id).or_default().push(row);
        }

        Ok(grouped)
    }
}
