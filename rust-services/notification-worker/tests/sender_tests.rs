//! Notification Sender Integration Tests

mod common;

use common::{sender_with_fallback, sink_only, CountingChannel};
use delivery_core::{DeliveryError, DeliveryStatus};
use herald_types::{ChannelKind, Message, NotificationType, SubscriptionAction, TargetSpec};

#[tokio::test]
async fn test_email_falls_back_past_unreachable_channel() {
    let brevo = CountingChannel::new("Brevo API", ChannelKind::HttpApi, 10);
    let sender = sender_with_fallback(&brevo);

    let message = Message::new(TargetSpec::Single("user@example.com".to_string()), "Welcome", "Hi");
    let outcome = sender
        .send_notification(NotificationType::Email, &message)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.channel_used, "Brevo API");
    assert_eq!(outcome.channel_kind, ChannelKind::HttpApi);
    assert_eq!(outcome.provider_message_id.as_deref(), Some("Brevo API-1"));
    assert_eq!(brevo.sends(), 1);

    let record = sender.ledger().get(&outcome.record_id).await.unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);
    assert_eq!(record.channel_used, "Brevo API");
}

#[tokio::test]
async fn test_push_without_channels_uses_sink() {
    let sender = sink_only(true);
    let message = Message::new(TargetSpec::multi(["t1", "t2", "t3"]), "Reminder", "Due soon");

    let outcome = sender.send_push(&message).await.unwrap();
    assert!(outcome.used_sink());
    assert_eq!(outcome.recipients_succeeded, Some(3));
    assert_eq!(outcome.recipients_failed, 0);
}

#[tokio::test]
async fn test_no_channels_and_no_sink_is_unavailable() {
    let sender = sink_only(false);
    let message = Message::new(TargetSpec::Single("user@example.com".to_string()), "Welcome", "Hi");

    let err = sender.send_email(&message).await.unwrap_err();
    assert!(matches!(err, DeliveryError::ChannelUnavailable { .. }));

    // The failed attempt is still on record
    let stats = sender.ledger().stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_invalid_message_is_rejected_and_recorded() {
    let sender = sink_only(true);
    let message = Message::new(TargetSpec::Single("user@example.com".to_string()), "", "Hi");

    let err = sender
        .send_notification(NotificationType::Email, &message)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_message");

    let record_id = err.record_id().unwrap();
    let record = sender.ledger().get(record_id).await.unwrap();
    assert_eq!(record.status, DeliveryStatus::Failed);
}

#[tokio::test]
async fn test_topic_subscription_through_sink() {
    let sender = sink_only(true);
    let ids = vec!["t1".to_string(), "t2".to_string()];

    let first = sender
        .update_subscription(SubscriptionAction::Subscribe, &ids, "news")
        .await
        .unwrap();
    assert!(first.success);
    assert_eq!(first.identifiers_succeeded, 2);
    assert_eq!(first.changed, Some(2));

    let again = sender
        .update_subscription(SubscriptionAction::Subscribe, &ids, "news")
        .await
        .unwrap();
    assert!(again.success);
    assert_eq!(again.changed, Some(0));
}

#[tokio::test]
async fn test_verify_channels_reports_each_descriptor() {
    let brevo = CountingChannel::new("Brevo API", ChannelKind::HttpApi, 10);
    let sender = sender_with_fallback(&brevo);

    let statuses = sender.verify_channels().await;
    assert_eq!(statuses.len(), 3);

    let smtp = statuses.iter().find(|s| s.name == "SMTP port 587").unwrap();
    assert_eq!(smtp.group, "email");
    assert!(!smtp.reachable);
    assert!(smtp.error.is_some());

    let api = statuses.iter().find(|s| s.name == "Brevo API").unwrap();
    assert!(api.reachable);

    assert_eq!(statuses.last().unwrap().group, "fallback");
}
