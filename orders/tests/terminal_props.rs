//! Property tests for order terminal-status immutability.
//!
//! Whatever sequence of complete/cancel/expire operations runs against an
//! order, at most one terminal transition commits, and every later attempt
//! fails `InvalidState` leaving all fields unchanged.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use ticketline_core::{Error, OrderStatus, PaymentId};
use ticketline_orders::store::{InMemoryOrderStore, OrderStore, OrderTransition};

#[derive(Clone, Copy, Debug)]
enum Op {
    Complete,
    Cancel,
    Expire,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Complete), Just(Op::Cancel), Just(Op::Expire)]
}

fn transition_for(op: Op, at: chrono::DateTime<chrono::Utc>) -> OrderTransition {
    match op {
        Op::Complete => OrderTransition {
            status: OrderStatus::Completed,
            payment_id: Some(PaymentId::new()),
            cancellation_reason: None,
            at,
        },
        Op::Cancel => OrderTransition {
            status: OrderStatus::Cancelled,
            payment_id: None,
            cancellation_reason: Some("cancelled".to_string()),
            at,
        },
        Op::Expire => OrderTransition {
            status: OrderStatus::Expired,
            payment_id: None,
            cancellation_reason: None,
            at,
        },
    }
}

mod fixtures {
    use chrono::{Duration, Utc};
    use ticketline_core::{Money, Order, OrderId, OrderStatus, TicketId, UserId};

    pub fn pending_order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            buyer_id: UserId::new(),
            ticket_id: TicketId::new(),
            seller_id: UserId::new(),
            event_name: "Terminal Props".to_string(),
            event_date: now + Duration::days(7),
            seat_info: None,
            price: Money::from_dollars(10),
            quantity: 1,
            total_amount: Money::from_dollars(10),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::minutes(15),
            payment_id: None,
            cancellation_reason: None,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn at_most_one_terminal_transition_commits(ops in prop::collection::vec(op_strategy(), 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let store = InMemoryOrderStore::new();
            let order = store.insert(fixtures::pending_order()).await.unwrap();
            let now = chrono::Utc::now();

            let mut committed: Option<OrderStatus> = None;

            for op in ops {
                let result = store.transition_if_pending(order.id, transition_for(op, now)).await;
                match (&committed, result) {
                    (None, Ok(transitioned)) => {
                        committed = Some(transitioned.status);
                    }
                    (Some(_), Err(Error::InvalidState(_))) => {}
                    (state, other) => {
                        return Err(TestCaseError::fail(format!(
                            "unexpected outcome {other:?} with committed state {state:?}"
                        )));
                    }
                }

                // The stored order always reflects exactly the first commit
                let stored = store.get(order.id).await.unwrap().unwrap();
                match committed {
                    Some(status) => prop_assert_eq!(stored.status, status),
                    None => prop_assert_eq!(stored.status, OrderStatus::Pending),
                }
            }

            Ok(())
        })?;
    }
}
