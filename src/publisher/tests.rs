use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use super::{EventEnvelope, PUBLISHED_TIME_FORMAT, PublishDefaults, Publisher};
use crate::broker::{MemoryBroker, MemoryConnector, SharedBroker};
use crate::config::{BrokerSettings, Settings};
use crate::connection::ConnectionState;

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.microservice = "users".to_string();
    for (name, host) in [("GeneralEventsRedis", "primary"), ("AuditRedis", "audit")] {
        settings.redis.insert(
            name.to_string(),
            BrokerSettings {
                host: Some(host.to_string()),
                ..Default::default()
            },
        );
    }
    settings
}

fn publisher() -> (Publisher, SharedBroker) {
    let broker = MemoryBroker::shared();
    let publisher = Publisher::new(settings(), Arc::new(MemoryConnector::new(broker.clone())));
    (publisher, broker)
}

fn data(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object")
}

fn envelopes(broker: &SharedBroker, channel: &str) -> Vec<EventEnvelope> {
    broker
        .lock()
        .unwrap()
        .published_on(channel)
        .iter()
        .map(|m| serde_json::from_str(&m.payload).expect("envelope"))
        .collect()
}

#[tokio::test]
async fn publish_user_created_reaches_subscriber() {
    let (publisher, broker) = publisher();
    let (_, mut rx) = broker.lock().unwrap().subscribe("main");

    assert!(publisher.publish("user.created", data(json!({"id": 42})), None, None).await);

    let message = rx.try_recv().expect("one message");
    assert!(rx.try_recv().is_err());
    assert!(message.payload.contains(r#""event":"user.created""#));
    assert!(message.payload.contains(r#""data":{"id":42}"#));

    let value = message.json().unwrap();
    assert_eq!(value["service"], "users");
    let time = value["published_time"].as_str().unwrap();
    assert!(NaiveDateTime::parse_from_str(time, PUBLISHED_TIME_FORMAT).is_ok());
}

#[tokio::test]
async fn envelope_fields_match_inputs() {
    let (publisher, broker) = publisher();
    let payload = json!({"id": 7, "roles": ["admin"], "profile": {"name": "Ann"}});

    assert!(publisher.publish("user.updated", data(payload.clone()), None, None).await);

    let sent = envelopes(&broker, "main");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, "user.updated");
    assert_eq!(sent[0].service, "users");
    assert_eq!(Value::Object(sent[0].data.clone()), payload);
}

#[tokio::test]
async fn published_time_is_non_decreasing() {
    let (publisher, broker) = publisher();
    for i in 0..5 {
        assert!(publisher.publish("tick", data(json!({"n": i})), None, None).await);
    }

    let times: Vec<_> = envelopes(&broker, "main")
        .into_iter()
        .map(|e| e.published_time)
        .collect();
    assert_eq!(times.len(), 5);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_returns_false_and_sends_nothing() {
    let (publisher, broker) = publisher();
    broker.lock().unwrap().set_reachable(false);
    let (_, mut rx) = broker.lock().unwrap().subscribe("main");

    let started = Instant::now();
    assert!(!publisher.publish("user.created", data(json!({"id": 42})), None, None).await);

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(11));
    assert!(rx.try_recv().is_err());
    assert!(broker.lock().unwrap().published().is_empty());
    assert_eq!(publisher.state().await, ConnectionState::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn every_publish_during_outage_pays_the_retry_budget() {
    let (publisher, broker) = publisher();
    broker.lock().unwrap().set_reachable(false);

    assert!(!publisher.publish("a", Map::new(), None, None).await);
    assert!(!publisher.publish("b", Map::new(), None, None).await);
    assert_eq!(broker.lock().unwrap().connect_attempts().len(), 20);

    broker.lock().unwrap().set_reachable(true);
    assert!(publisher.publish("c", Map::new(), None, None).await);
    assert_eq!(envelopes(&broker, "main")[0].event, "c");
}

#[tokio::test]
async fn send_failure_returns_false() {
    let (publisher, broker) = publisher();
    broker.lock().unwrap().fail_publishes(true);

    assert!(!publisher.publish("user.created", Map::new(), None, None).await);
    assert!(broker.lock().unwrap().published().is_empty());
    // the link itself is still healthy
    assert_eq!(publisher.state().await, ConnectionState::Connected);

    broker.lock().unwrap().fail_publishes(false);
    assert!(publisher.publish("user.created", Map::new(), None, None).await);
}

#[tokio::test]
async fn missing_config_returns_false() {
    let (publisher, broker) = publisher();

    assert!(!publisher.publish("e", Map::new(), None, Some("Nope")).await);
    assert!(broker.lock().unwrap().connect_attempts().is_empty());
    assert_eq!(publisher.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn dropped_link_is_replaced_before_publishing() {
    let (publisher, broker) = publisher();
    assert!(publisher.publish("first", Map::new(), None, None).await);

    broker.lock().unwrap().drop_connections();

    assert!(publisher.publish("second", Map::new(), None, None).await);
    assert_eq!(broker.lock().unwrap().connect_attempts().len(), 2);
    assert_eq!(envelopes(&broker, "main").len(), 2);
}

#[tokio::test]
async fn channel_override_persists_for_later_calls() {
    let (publisher, broker) = publisher();

    assert!(publisher.publish("one", Map::new(), Some("accounts"), None).await);
    assert!(publisher.publish("two", Map::new(), None, None).await);

    assert!(envelopes(&broker, "main").is_empty());
    let sent: Vec<_> = envelopes(&broker, "accounts").into_iter().map(|e| e.event).collect();
    assert_eq!(sent, ["one", "two"]);
    assert_eq!(publisher.defaults().await.channel, "accounts");
}

#[tokio::test]
async fn config_name_override_persists_for_later_connects() {
    let (publisher, broker) = publisher();

    // overriding while the broker is fresh connects to the override
    assert!(publisher.publish("one", Map::new(), None, Some("AuditRedis")).await);
    broker.lock().unwrap().drop_connections();
    // no override: the reconnect still uses AuditRedis
    assert!(publisher.publish("two", Map::new(), None, None).await);

    let hosts: Vec<_> = broker
        .lock()
        .unwrap()
        .connect_attempts()
        .iter()
        .map(|a| a.host.clone())
        .collect();
    assert_eq!(hosts, ["audit", "audit"]);
    assert_eq!(publisher.defaults().await.config_name, "AuditRedis");
}

#[tokio::test]
async fn config_name_override_keeps_healthy_link() {
    let (publisher, broker) = publisher();
    assert!(publisher.publish("one", Map::new(), None, None).await);

    assert!(publisher.publish("two", Map::new(), None, Some("AuditRedis")).await);

    let hosts: Vec<_> = broker
        .lock()
        .unwrap()
        .connect_attempts()
        .iter()
        .map(|a| a.host.clone())
        .collect();
    assert_eq!(hosts, ["primary"]);
}

#[tokio::test]
async fn ephemeral_channel_does_not_touch_defaults() {
    let (publisher, broker) = publisher();

    assert!(publisher.publish_ephemeral("one", Map::new(), "audit").await);
    assert!(publisher.publish("two", Map::new(), None, None).await);

    assert_eq!(envelopes(&broker, "audit").len(), 1);
    assert_eq!(envelopes(&broker, "main").len(), 1);
    assert_eq!(
        publisher.defaults().await,
        PublishDefaults {
            channel: "main".to_string(),
            config_name: "GeneralEventsRedis".to_string(),
        }
    );
}

#[tokio::test]
async fn set_default_operations_change_later_publishes() {
    let (publisher, broker) = publisher();

    publisher.set_default_channel("billing").await;
    publisher.set_default_config_name("AuditRedis").await;
    assert!(publisher.publish("invoice.paid", Map::new(), None, None).await);

    assert_eq!(envelopes(&broker, "billing").len(), 1);
    assert_eq!(broker.lock().unwrap().connect_attempts()[0].host, "audit");
}

#[tokio::test]
async fn check_connects_and_caches_service_name() {
    let (publisher, _broker) = publisher();
    assert_eq!(publisher.service_name().await, None);

    assert!(publisher.check().await);
    assert_eq!(publisher.state().await, ConnectionState::Connected);
    assert_eq!(publisher.service_name().await.as_deref(), Some("users"));
}

#[tokio::test]
async fn shared_publisher_serves_concurrent_callers() {
    let (publisher, broker) = publisher();
    let publisher = Arc::new(publisher);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                publisher
                    .publish("tick", data(json!({"n": i})), None, None)
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(envelopes(&broker, "main").len(), 8);
    assert_eq!(broker.lock().unwrap().connect_attempts().len(), 1);
}
