use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_core::{CoreError, CoreResult};
use dropship_order::notification::{DeliveryOutcome, EmailNotification, MAX_RETRIES};
use dropship_order::repository::NotificationRepository;
use uuid::Uuid;

use crate::database::db_error;
use crate::order_repo::PgStore;

const NOTIFICATION_COLUMNS: &str = "id, order_id, recipient_type, recipient_address, subject, status, sent_at, \
    failure_reason, retry_count, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    order_id: Uuid,
    recipient_type: String,
    recipient_address: String,
    subject: String,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    retry_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for EmailNotification {
    type Error = CoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(EmailNotification {
            id: row.id,
            order_id: row.order_id,
            recipient_type: row.recipient_type.parse()?,
            recipient_address: row.recipient_address,
            subject: row.subject,
            status: row.status.parse()?,
            sent_at: row.sent_at,
            failure_reason: row.failure_reason,
            retry_count: row.retry_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert(rows: Vec<NotificationRow>) -> CoreResult<Vec<EmailNotification>> {
    rows.into_iter().map(EmailNotification::try_from).collect()
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn create_notification(&self, n: &EmailNotification) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO email_notifications (id, order_id, recipient_type, recipient_address, subject, status,
                sent_at, failure_reason, retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(n.id)
        .bind(n.order_id)
        .bind(n.recipient_type.as_str())
        .bind(&n.recipient_address)
        .bind(&n.subject)
        .bind(n.status.as_str())
        .bind(n.sent_at)
        .bind(&n.failure_reason)
        .bind(n.retry_count)
        .bind(n.created_at)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn record_outcome(&self, id: Uuid, outcome: &DeliveryOutcome) -> CoreResult<EmailNotification> {
        let sql = format!(
            "UPDATE email_notifications \
             SET status = $2, \
                 sent_at = CASE WHEN $4 THEN NOW() ELSE sent_at END, \
                 failure_reason = $3, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        );
        let row: Option<NotificationRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(outcome.status().as_str())
            .bind(outcome.failure_reason())
            .bind(*outcome == DeliveryOutcome::Sent)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(EmailNotification::try_from)
            .transpose()?
            .ok_or_else(|| CoreError::not_found("notification", id))
    }

    async fn get_notification(&self, id: Uuid) -> CoreResult<Option<EmailNotification>> {
        let sql = format!("SELECT {} FROM email_notifications WHERE id = $1", NOTIFICATION_COLUMNS);
        let row: Option<NotificationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(EmailNotification::try_from).transpose()
    }

    async fn begin_retry(&self, id: Uuid) -> CoreResult<Option<EmailNotification>> {
        let sql = format!(
            "UPDATE email_notifications \
             SET status = 'PENDING', retry_count = retry_count + 1, updated_at = NOW() \
             WHERE id = $1 AND status = 'FAILED' AND retry_count < $2 \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        );
        let row: Option<NotificationRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(MAX_RETRIES)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None => match self.get_notification(id).await? {
                Some(_) => Ok(None),
                None => Err(CoreError::not_found("notification", id)),
            },
        }
    }

    async fn list_retryable(&self) -> CoreResult<Vec<EmailNotification>> {
        let sql = format!(
            "SELECT {} FROM email_notifications WHERE status = 'FAILED' AND retry_count < $1 \
             ORDER BY created_at ASC",
            NOTIFICATION_COLUMNS
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(MAX_RETRIES)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        convert(rows)
    }

    async fn list_failed(&self) -> CoreResult<Vec<EmailNotification>> {
        let sql = format!(
            "SELECT {} FROM email_notifications WHERE status IN ('FAILED', 'BOUNCED') \
             ORDER BY created_at DESC",
            NOTIFICATION_COLUMNS
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        convert(rows)
    }

    async fn list_for_order(&self, order_id: Uuid) -> CoreResult<Vec<EmailNotification>> {
        let sql = format!(
            "SELECT {} FROM email_notifications WHERE order_id = $1 ORDER BY created_at ASC",
            NOTIFICATION_COLUMNS
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        convert(rows)
    }

    async fn fail_stale_pending(&self, older_than: DateTime<Utc>, reason: &str) -> CoreResult<u64> {
        let result = sqlx::query(
            "UPDATE email_notifications SET status = 'FAILED', failure_reason = $2, updated_at = NOW() \
             WHERE status = 'PENDING' AND updated_at < $1",
        )
        .bind(older_than)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}
