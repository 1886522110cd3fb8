use chrono::Utc;

use tradedesk_core::approvals::ApprovalLedger;
use tradedesk_core::domain::currency::Currency;
use tradedesk_core::domain::department::{Department, Role, UserContext};
use tradedesk_core::domain::quote::{Quote, QuoteId};
use tradedesk_core::domain::status::WorkflowStatus;
use tradedesk_core::workflow::{QuoteStore, WorkflowConfig, WorkflowError, WorkflowService};
use tradedesk_db::{connect_with_settings, migrations, SqlApprovalRepository, SqlQuoteRepository};

async fn service() -> WorkflowService<SqlQuoteRepository, ApprovalLedger<SqlApprovalRepository>> {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory pool");
    migrations::run_pending(&pool).await.expect("migrations apply");
    WorkflowService::new(
        SqlQuoteRepository::new(pool.clone()),
        ApprovalLedger::new(SqlApprovalRepository::new(pool)),
        WorkflowConfig::standard(),
    )
}

fn user(role: Role) -> UserContext {
    UserContext::new(format!("u-{}", role.as_str()), [role])
}

#[tokio::test]
async fn full_quote_lifecycle_persists_through_sqlite() {
    let service = service().await;
    let id = QuoteId("Q-LIFE-1".to_owned());
    service
        .store()
        .insert(Quote::new(id.clone(), "TD-2026-0100", Currency::Usd, Utc::now()))
        .await
        .expect("seed quote");

    service
        .transition_quote_status(&id, WorkflowStatus::PendingProcurement, &user(Role::Sales), None)
        .await
        .expect("submit for procurement");
    service
        .transition_quote_status(
            &id,
            WorkflowStatus::PendingLogisticsAndCustoms,
            &user(Role::Procurement),
            None,
        )
        .await
        .expect("procurement evaluated");

    // Parallel fork: both legs must complete before sales review.
    service.complete_logistics(&id, &user(Role::Logistics)).await.expect("logistics leg");
    let stages = service.get_parallel_stages_status(&id).await.expect("stages");
    assert!(stages.logistics);
    assert!(!stages.customs);
    service.complete_customs(&id, &user(Role::Customs)).await.expect("customs leg");

    let quote = service.store().get(&id).await.expect("quote");
    assert_eq!(quote.status, WorkflowStatus::PendingSalesReview);

    service
        .transition_quote_status(&id, WorkflowStatus::PendingQuoteControl, &user(Role::Sales), None)
        .await
        .expect("sales review done");
    service
        .transition_quote_status(&id, WorkflowStatus::PendingApproval, &user(Role::Control), None)
        .await
        .expect("quote control done");

    // The department gate blocks approval until all five have signed.
    let error = service
        .transition_quote_status(&id, WorkflowStatus::Approved, &user(Role::Management), None)
        .await
        .expect_err("departments still pending");
    assert!(matches!(error, WorkflowError::ApprovalsIncomplete { .. }));

    for department in Department::ALL {
        let approver = UserContext::new(
            format!("u-{department}"),
            [Role::for_department(department)],
        );
        service
            .gate()
            .approve_department(&id, department, &approver)
            .await
            .expect("department approves in order");
    }

    service
        .transition_quote_status(&id, WorkflowStatus::Approved, &user(Role::Management), None)
        .await
        .expect("approval after the gate clears");
    service
        .transition_quote_status(&id, WorkflowStatus::SentToClient, &user(Role::Sales), None)
        .await
        .expect("sent to client");
    service
        .transition_quote_status(&id, WorkflowStatus::PendingSpecControl, &user(Role::Sales), None)
        .await
        .expect("client accepted");
    service
        .transition_quote_status(
            &id,
            WorkflowStatus::PendingSignature,
            &user(Role::SpecControl),
            None,
        )
        .await
        .expect("spec control cleared");
    service
        .transition_quote_status(
            &id,
            WorkflowStatus::SpecificationSigned,
            &user(Role::Sales),
            None,
        )
        .await
        .expect("specification signed");
    service
        .transition_quote_status(&id, WorkflowStatus::Deal, &user(Role::Sales), None)
        .await
        .expect("deal created");

    let quote = service.store().get(&id).await.expect("quote");
    assert_eq!(quote.status, WorkflowStatus::Deal);

    let history = service.store().history(&id).await.expect("history");
    assert_eq!(history.len(), 11);
    assert_eq!(history[0].from_status, WorkflowStatus::Draft);
    assert!(history.iter().any(|record| record.automatic));
    assert_eq!(history.last().map(|record| record.to_status), Some(WorkflowStatus::Deal));
}

#[tokio::test]
async fn terminal_quote_refuses_further_transitions() {
    let service = service().await;
    let id = QuoteId("Q-LIFE-2".to_owned());
    let mut quote = Quote::new(id.clone(), "TD-2026-0101", Currency::Eur, Utc::now());
    quote.status = WorkflowStatus::Deal;
    service.store().insert(quote).await.expect("seed quote");

    let error = service
        .transition_quote_status(
            &id,
            WorkflowStatus::Draft,
            &UserContext::new("u-admin", [Role::Admin]),
            None,
        )
        .await
        .expect_err("terminal state");

    assert!(matches!(error, WorkflowError::Denied { .. }));
}
