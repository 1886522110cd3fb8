use async_trait::async_trait;
use sqlx::Row;

use tradedesk_core::approvals::{ApprovalSet, ApprovalStore, DepartmentApproval};
use tradedesk_core::domain::department::Department;
use tradedesk_core::domain::quote::QuoteId;
use tradedesk_core::errors::StoreError;

use super::{backend_error, parse_timestamp};
use crate::DbPool;

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for SqlApprovalRepository {
    async fn get(&self, id: &QuoteId) -> Result<Option<ApprovalSet>, StoreError> {
        let version_row = sqlx::query("SELECT version FROM approval_set WHERE quote_id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        let Some(version_row) = version_row else {
            return Ok(None);
        };
        let version: i64 = version_row.try_get("version").map_err(backend_error)?;

        let rows = sqlx::query(
            "SELECT department, approved, approver, comment, decided_at
             FROM department_approval WHERE quote_id = ?",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let mut set = ApprovalSet::new(id.clone());
        set.version = version.max(0) as u64;
        for row in &rows {
            let department_raw: String = row.try_get("department").map_err(backend_error)?;
            let department = Department::parse(&department_raw).ok_or_else(|| {
                StoreError::Backend(format!("unknown stored department `{department_raw}`"))
            })?;
            let decided_at: Option<String> = row.try_get("decided_at").map_err(backend_error)?;
            set.entries.insert(
                department,
                DepartmentApproval {
                    approved: row.try_get("approved").map_err(backend_error)?,
                    approver: row.try_get("approver").map_err(backend_error)?,
                    comment: row.try_get("comment").map_err(backend_error)?,
                    decided_at: decided_at
                        .map(|raw| parse_timestamp(&raw, "decided_at"))
                        .transpose()?,
                },
            );
        }

        Ok(Some(set))
    }

    /// The whole set writes in one transaction guarded by the version
    /// row, so two reviewers racing on the same quote cannot interleave
    /// partial approval states.
    async fn save(
        &self,
        set: ApprovalSet,
        expected_version: u64,
    ) -> Result<ApprovalSet, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        let stored_version: Option<i64> =
            sqlx::query("SELECT version FROM approval_set WHERE quote_id = ?")
                .bind(&set.quote_id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend_error)?
                .map(|row| row.try_get("version"))
                .transpose()
                .map_err(backend_error)?;
        let current_version = stored_version.unwrap_or(0).max(0) as u64;
        if current_version != expected_version {
            return Err(StoreError::Conflict(set.quote_id.0.clone()));
        }

        let new_version = expected_version + 1;
        sqlx::query(
            "INSERT INTO approval_set (quote_id, version) VALUES (?, ?)
             ON CONFLICT(quote_id) DO UPDATE SET version = excluded.version",
        )
        .bind(&set.quote_id.0)
        .bind(new_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(backend_error)?;

        sqlx::query("DELETE FROM department_approval WHERE quote_id = ?")
            .bind(&set.quote_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        for (department, entry) in &set.entries {
            sqlx::query(
                "INSERT INTO department_approval (quote_id, department, approved, approver,
                                                  comment, decided_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&set.quote_id.0)
            .bind(department.as_str())
            .bind(entry.approved)
            .bind(&entry.approver)
            .bind(&entry.comment)
            .bind(entry.decided_at.map(|timestamp| timestamp.to_rfc3339()))
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)?;

        let mut stored = set;
        stored.version = new_version;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use tradedesk_core::approvals::{ApprovalLedger, ApprovalStore};
    use tradedesk_core::domain::department::{Department, Role, UserContext};
    use tradedesk_core::domain::quote::QuoteId;
    use tradedesk_core::errors::StoreError;

    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    use super::SqlApprovalRepository;

    async fn repository() -> SqlApprovalRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory pool");
        run_pending(&pool).await.expect("migrations apply");
        SqlApprovalRepository::new(pool)
    }

    fn quote_id() -> QuoteId {
        QuoteId("Q-9".to_owned())
    }

    #[tokio::test]
    async fn ledger_rollback_survives_a_database_round_trip() {
        let ledger = ApprovalLedger::new(repository().await);
        for department in Department::ALL {
            let user =
                UserContext::new(format!("u-{department}"), [Role::for_department(department)]);
            ledger
                .approve_department(&quote_id(), department, &user)
                .await
                .expect("approval in order");
        }

        let customs = UserContext::new("u-customs", [Role::Customs]);
        ledger
            .reject_department(&quote_id(), Department::Customs, &customs, "hs code mismatch")
            .await
            .expect("rejection");

        let set = ledger.store().get(&quote_id()).await.expect("get").expect("stored set");
        assert!(set.is_approved(Department::Procurement));
        assert!(set.is_approved(Department::Logistics));
        assert!(!set.is_approved(Department::Customs));
        assert!(!set.is_approved(Department::Sales));
        assert!(!set.is_approved(Department::Control));
    }

    #[tokio::test]
    async fn stale_save_is_a_conflict() {
        let repo = repository().await;
        let set = tradedesk_core::approvals::ApprovalSet::new(quote_id());

        repo.save(set.clone(), 0).await.expect("first save");
        let error = repo.save(set, 0).await.expect_err("second stale save");

        assert!(matches!(error, StoreError::Conflict(_)));
    }
}
