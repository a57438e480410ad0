//! Postgres-backed notification and preference stores.
//!
//! Tables come from the shared migration run by
//! `PostgresEventStore::run_migrations`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use common::UserId;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::model::{
    EntityKind, EntityRef, Notification, NotificationFilter, NotificationId, NotificationType,
    Priority,
};
use crate::preferences::{
    CategoryToggles, NotificationPreference, PreferenceStore, PreferenceUpdate, QuietHours,
    SmsToggles,
};
use crate::store::NotificationStore;

const NOTIFICATION_COLUMNS: &str = "id, recipient, sender, notification_type, title, message, \
     priority, entity_kind, entity_id, action_url, is_read, read_at, is_sent, sent_at, \
     created_at, expires_at";

const PREFERENCE_COLUMNS: &str =
    "user_id, email, push, sms, quiet_start, quiet_end, created_at, updated_at";

fn unknown(column: &str, value: &str) -> NotificationError {
    NotificationError::Store(format!("unknown {column} '{value}'"))
}

fn row_to_notification(row: &PgRow) -> Result<Notification> {
    let type_name: String = row.try_get("notification_type")?;
    let notification_type = NotificationType::parse(&type_name)
        .ok_or_else(|| unknown("notification type", &type_name))?;
    let priority_name: String = row.try_get("priority")?;
    let priority =
        Priority::parse(&priority_name).ok_or_else(|| unknown("priority", &priority_name))?;

    let entity_kind: Option<String> = row.try_get("entity_kind")?;
    let entity_id: Option<Uuid> = row.try_get("entity_id")?;
    let entity = match (entity_kind, entity_id) {
        (Some(kind), Some(id)) => {
            let kind = EntityKind::parse(&kind).ok_or_else(|| unknown("entity kind", &kind))?;
            Some(EntityRef::new(kind, id))
        }
        _ => None,
    };

    Ok(Notification {
        id: NotificationId::from_uuid(row.try_get::<Uuid, _>("id")?),
        recipient: UserId::from_uuid(row.try_get::<Uuid, _>("recipient")?),
        sender: row
            .try_get::<Option<Uuid>, _>("sender")?
            .map(UserId::from_uuid),
        notification_type,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        priority,
        entity,
        action_url: row.try_get("action_url")?,
        is_read: row.try_get("is_read")?,
        read_at: row.try_get("read_at")?,
        is_sent: row.try_get("is_sent")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

/// Notifications in the `notifications` table.
#[derive(Clone)]
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient, sender, notification_type, title, message, priority,
                entity_kind, entity_id, action_url, is_read, read_at, is_sent, sent_at,
                created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(notification.id.as_uuid())
        .bind(notification.recipient.as_uuid())
        .bind(notification.sender.map(|s| s.as_uuid()))
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.priority.as_str())
        .bind(notification.entity.map(|e| e.kind.as_str()))
        .bind(notification.entity.map(|e| e.id))
        .bind(&notification.action_url)
        .bind(notification.is_read)
        .bind(notification.read_at)
        .bind(notification.is_sent)
        .bind(notification.sent_at)
        .bind(notification.created_at)
        .bind(notification.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, recipient: UserId, id: NotificationId) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1 AND recipient = $2"
        ))
        .bind(id.as_uuid())
        .bind(recipient.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_notification(&row),
            None => Err(NotificationError::NotFound(id)),
        }
    }

    async fn mark_read(
        &self,
        recipient: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<Notification> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND recipient = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(recipient.as_uuid())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_notification(&row),
            None => Err(NotificationError::NotFound(id)),
        }
    }

    async fn mark_all_read(&self, recipient: UserId, at: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 \
             WHERE recipient = $1 AND NOT is_read",
        )
        .bind(recipient.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn mark_sent(&self, id: NotificationId, at: DateTime<Utc>) -> Result<()> {
        let result =
            sqlx::query("UPDATE notifications SET is_sent = TRUE, sent_at = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(at)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, recipient: UserId, id: NotificationId) -> Result<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient = $2")
            .bind(id.as_uuid())
            .bind(recipient.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(NotificationError::NotFound(id));
        }
        Ok(())
    }

    async fn clear(&self, recipient: UserId, read_only: bool) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE recipient = $1 AND ($2 = FALSE OR is_read)",
        )
        .bind(recipient.as_uuid())
        .bind(read_only)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn list(
        &self,
        recipient: UserId,
        filter: NotificationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient = "
        ));
        query.push_bind(recipient.as_uuid());

        if let Some(notification_type) = filter.notification_type {
            query
                .push(" AND notification_type = ")
                .push_bind(notification_type.as_str());
        }
        if let Some(is_read) = filter.is_read {
            query.push(" AND is_read = ").push_bind(is_read);
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        if !filter.include_expired {
            query
                .push(" AND (expires_at IS NULL OR expires_at > ")
                .push_bind(now)
                .push(")");
        }
        query.push(" ORDER BY created_at DESC, id");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn unsent(&self, limit: usize) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE NOT is_sent ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_notification).collect()
    }
}

fn row_to_preference(row: &PgRow) -> Result<NotificationPreference> {
    let quiet_start: Option<NaiveTime> = row.try_get("quiet_start")?;
    let quiet_end: Option<NaiveTime> = row.try_get("quiet_end")?;
    let Json(email) = row.try_get::<Json<CategoryToggles>, _>("email")?;
    let Json(push) = row.try_get::<Json<CategoryToggles>, _>("push")?;
    let Json(sms) = row.try_get::<Json<SmsToggles>, _>("sms")?;

    Ok(NotificationPreference {
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        email,
        push,
        sms,
        quiet_hours: quiet_start
            .zip(quiet_end)
            .map(|(start, end)| QuietHours::new(start, end)),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Preferences in the `notification_preferences` table, one row per user.
#[derive(Clone)]
pub struct PostgresPreferenceStore {
    pool: PgPool,
}

impl PostgresPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_defaults<'e, E>(executor: E, user_id: UserId) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let defaults = NotificationPreference::defaults(user_id);
        sqlx::query(
            r#"
            INSERT INTO notification_preferences
                (user_id, email, push, sms, quiet_start, quiet_end, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NULL, NULL, $5, $5)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(Json(defaults.email))
        .bind(Json(defaults.push))
        .bind(Json(defaults.sms))
        .bind(defaults.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PostgresPreferenceStore {
    async fn get_or_create(&self, user_id: UserId) -> Result<NotificationPreference> {
        Self::insert_defaults(&self.pool, user_id).await?;
        let row = sqlx::query(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        row_to_preference(&row)
    }

    async fn update(
        &self,
        user_id: UserId,
        update: PreferenceUpdate,
    ) -> Result<NotificationPreference> {
        let mut tx = self.pool.begin().await?;
        Self::insert_defaults(&mut *tx, user_id).await?;

        let row = sqlx::query(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences \
             WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let mut preference = row_to_preference(&row)?;
        preference.apply(&update);

        sqlx::query(
            r#"
            UPDATE notification_preferences
            SET email = $2, push = $3, sms = $4, quiet_start = $5, quiet_end = $6, updated_at = $7
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(Json(preference.email))
        .bind(Json(preference.push))
        .bind(Json(preference.sms))
        .bind(preference.quiet_hours.map(|q| q.start))
        .bind(preference.quiet_hours.map(|q| q.end))
        .bind(preference.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(preference)
    }
}
