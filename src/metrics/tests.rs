use super::memory::MemoryMetrics;
use super::redis::users_key;
use super::{MetricsHandler, create_metrics};

#[tokio::test]
async fn test_memory_metrics_counts_users() {
    let metrics = MemoryMetrics::new();
    metrics.increment_users("127.0.0.1:3000").await.unwrap();
    metrics.increment_users("127.0.0.1:3000").await.unwrap();
    metrics.decrement_users("127.0.0.1:3000").await.unwrap();
    assert_eq!(metrics.nb_users().await.unwrap(), 1);

    metrics.reset_users("127.0.0.1:3000").await.unwrap();
    assert_eq!(metrics.nb_users().await.unwrap(), 0);
}

#[tokio::test]
async fn test_memory_metrics_never_goes_negative() {
    let metrics = MemoryMetrics::new();
    metrics.decrement_users("addr").await.unwrap();
    assert_eq!(metrics.nb_users().await.unwrap(), 0);
}

#[test]
fn test_users_key() {
    assert_eq!(users_key("0.0.0.0:3000"), "users:0.0.0.0:3000");
}

#[tokio::test]
async fn test_create_metrics_selects_by_scheme() {
    assert!(create_metrics("null://").await.is_ok());
    assert!(create_metrics("php://localhost?size=1").await.is_ok());
    assert!(create_metrics("kafka://localhost").await.is_err());
}
