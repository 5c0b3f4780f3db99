//! Property-based checks for the lifecycle table and reason-code display.

use orderdesk::{
    models::{refund_reason_text, OrderAction, OrderStatus, PaymentStatus, RefundReason, Role},
    services::order_status::{
        action_for_target, authorize, available_actions, is_offered, is_valid_transition,
        transition,
    },
};
use proptest::prelude::*;
use strum::IntoEnumIterator;

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop::sample::select(OrderStatus::iter().collect::<Vec<_>>())
}

fn action_strategy() -> impl Strategy<Value = OrderAction> {
    prop::sample::select(OrderAction::iter().collect::<Vec<_>>())
}

fn payment_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop::sample::select(PaymentStatus::iter().collect::<Vec<_>>())
}

fn role_strategy() -> impl Strategy<Value = Option<Role>> {
    prop_oneof![Just(None), Just(Some(Role::Admin)), Just(Some(Role::Customer))]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn offered_actions_are_a_subset_of_the_table(
        status in status_strategy(),
        payment in payment_strategy(),
        role in role_strategy(),
    ) {
        for action in available_actions(status, payment, role) {
            prop_assert!(is_offered(status, action));
            prop_assert!(authorize(status, payment, action, role).is_ok());
        }
    }

    #[test]
    fn anonymous_actors_are_offered_nothing(
        status in status_strategy(),
        payment in payment_strategy(),
    ) {
        prop_assert!(available_actions(status, payment, None).is_empty());
    }

    #[test]
    fn roles_never_share_an_action(
        status in status_strategy(),
        payment in payment_strategy(),
    ) {
        let admin = available_actions(status, payment, Some(Role::Admin));
        let customer = available_actions(status, payment, Some(Role::Customer));
        prop_assert!(admin.iter().all(|a| !customer.contains(a)));
        prop_assert!(!admin.contains(&OrderAction::RequestRefund));
    }

    #[test]
    fn terminal_statuses_accept_no_action(action in action_strategy()) {
        for status in OrderStatus::iter().filter(OrderStatus::is_terminal) {
            prop_assert!(transition(status, action).is_err());
        }
    }

    #[test]
    fn targets_round_trip_through_actions(from in status_strategy(), to in status_strategy()) {
        match action_for_target(from, to) {
            Some(action) => {
                prop_assert_eq!(transition(from, action).ok().flatten(), Some(to));
                prop_assert!(is_valid_transition(from, to));
            }
            None => prop_assert!(!is_valid_transition(from, to)),
        }
    }

    #[test]
    fn refund_requires_payment(status in status_strategy()) {
        prop_assert!(authorize(
            status,
            PaymentStatus::Unpaid,
            OrderAction::RequestRefund,
            Some(Role::Customer)
        )
        .is_err());
    }

    #[test]
    fn unknown_reason_codes_display_verbatim(code in "[a-z_ ]{1,24}") {
        prop_assume!(code.parse::<RefundReason>().is_err());
        prop_assert_eq!(refund_reason_text(&code), code.clone());
    }

    #[test]
    fn reason_text_is_idempotent_on_its_output(code in "\\PC{1,24}") {
        let once = refund_reason_text(&code);
        prop_assert!(!once.is_empty());
        prop_assert_eq!(refund_reason_text(&once), once.clone());
    }
}

#[test]
fn known_reason_codes_have_labels() {
    for reason in RefundReason::iter() {
        assert_eq!(refund_reason_text(reason.code()), reason.label());
        assert_ne!(refund_reason_text(reason.code()), reason.code());
    }
}

#[test]
fn empty_reason_code_is_shown_as_empty() {
    assert_eq!(refund_reason_text(""), "");
}
