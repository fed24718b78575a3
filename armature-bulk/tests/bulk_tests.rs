//! Integration tests for the streaming, summary and backoff bulk helpers.

mod common;

use armature_bulk::*;
use common::{MockTransport, index_actions, respond};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_two_actions_one_per_chunk() {
    let client = MockTransport::accepting();
    let actions = vec![
        Action::index("i", json!({ "a": 1 })).with_id("1"),
        Action::index("i", json!({ "b": 2 })).with_id("2"),
    ];

    let mut stream = streaming_bulk(&client, actions, BulkOptions::default().with_chunk_size(1));
    let mut ids = Vec::new();
    while let Some(outcome) = stream.next().await {
        let outcome = outcome.unwrap();
        assert!(outcome.is_ok());
        ids.push(outcome.id().unwrap().to_string());
    }

    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(client.bulk_calls(), 2);
    for body in client.bodies() {
        assert_eq!(body.len(), 2);
    }
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    let client = MockTransport::accepting();

    let outcomes: Vec<Outcome> = streaming_bulk(
        &client,
        index_actions("i", 50),
        BulkOptions::default().with_chunk_size(7),
    )
    .into_stream()
    .map(|outcome| outcome.unwrap())
    .collect()
    .await;

    let ids: Vec<String> = outcomes.iter().map(|o| o.id().unwrap().to_string()).collect();
    let expected: Vec<String> = (0..50).map(|n| n.to_string()).collect();
    assert_eq!(ids, expected);
    assert_eq!(client.bulk_calls(), 8);
}

#[tokio::test]
async fn test_byte_limit_splits_batches() {
    let client = MockTransport::accepting();
    let actions: Vec<Action> = (0..10)
        .map(|n| Action::index("i", json!({ "text": "x".repeat(100) })).with_id(n))
        .collect();
    let one = expand_action(&actions[0]).byte_size();

    let stats = bulk(
        &client,
        actions,
        BulkOptions::default().with_max_chunk_bytes(one * 3),
    )
    .await
    .unwrap();

    assert_eq!(stats.succeeded, 10);
    assert_eq!(client.bulk_calls(), 4);
}

#[tokio::test]
async fn test_bulk_stats() {
    let client = MockTransport::accepting();

    let stats = bulk(&client, index_actions("i", 100), BulkOptions::default())
        .await
        .unwrap();
    assert_eq!(stats.succeeded, 100);
    assert!(stats.errors.is_empty());

    let stats = bulk(
        &client,
        index_actions("i", 100),
        BulkOptions::default().with_stats_only(true),
    )
    .await
    .unwrap();
    assert_eq!(stats.succeeded, 100);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_bulk_collects_errors_without_raising() {
    let client = MockTransport::rejecting(&["2"]);
    let options = BulkOptions::default().with_raise_on_error(false);

    let stats = bulk(&client, index_actions("i", 4), options.clone()).await.unwrap();
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].id(), Some("2"));

    let stats = bulk(&client, index_actions("i", 4), options.with_stats_only(true))
        .await
        .unwrap();
    assert_eq!(stats.failed, 1);
    assert!(stats.errors.is_empty());
}

#[tokio::test]
async fn test_raise_on_error_yields_successes_first() {
    let client = MockTransport::rejecting(&["1"]);

    let mut stream = streaming_bulk(&client, index_actions("i", 3), BulkOptions::default());

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.id(), Some("0"));
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.id(), Some("2"));

    match stream.next().await {
        Some(Err(BulkError::BulkIndex(e))) => {
            assert_eq!(e.errors.len(), 1);
            assert_eq!(e.errors[0].id(), Some("1"));
            assert_eq!(e.errors[0].status(), Some(400));
            assert_eq!(e.errors[0].failure_kind(), Some(FailureKind::Item));
            assert_eq!(e.errors[0].detail().data, Some(json!({ "n": 1 })));
            assert_eq!(e.to_string(), "1 document(s) failed to index.");
        }
        other => panic!("expected BulkIndexError, got {:?}", other),
    }
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_raise_on_error_stops_after_failing_batch() {
    let client = MockTransport::rejecting(&["0"]);

    let result = bulk(
        &client,
        index_actions("i", 6),
        BulkOptions::default().with_chunk_size(2),
    )
    .await;

    assert!(matches!(result, Err(BulkError::BulkIndex(_))));
    assert_eq!(client.bulk_calls(), 1);
}

#[tokio::test]
async fn test_transport_error_raised_by_default() {
    let client = MockTransport::new(|_, _| Err(TransportError::new(500, "boom")));

    let result = bulk(&client, index_actions("i", 3), BulkOptions::default()).await;

    match result {
        Err(e) => assert_eq!(e.status(), Some(500)),
        Ok(stats) => panic!("expected an error, got {:?}", stats),
    }
}

#[tokio::test]
async fn test_transport_error_degrades_to_item_failures() {
    let client = MockTransport::new(|_, _| Err(TransportError::new(500, "boom")));
    let options = BulkOptions::default()
        .with_raise_on_exception(false)
        .with_raise_on_error(false);

    let outcomes: Vec<Outcome> = streaming_bulk(&client, index_actions("i", 3), options)
        .into_stream()
        .map(|outcome| outcome.unwrap())
        .collect()
        .await;

    assert_eq!(outcomes.len(), 3);
    for (n, outcome) in outcomes.iter().enumerate() {
        assert!(!outcome.is_ok());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transport));
        assert_eq!(outcome.status(), Some(500));
        assert_eq!(outcome.id(), Some(n.to_string().as_str()));
        assert_eq!(outcome.detail().error, Some(json!("boom")));
    }
}

#[tokio::test]
async fn test_degraded_transport_error_still_raises_items() {
    let client = MockTransport::new(|_, _| Err(TransportError::connection("refused")));
    let options = BulkOptions::default().with_raise_on_exception(false);

    match bulk(&client, index_actions("i", 2), options).await {
        Err(BulkError::BulkIndex(e)) => assert_eq!(e.errors.len(), 2),
        other => panic!("expected BulkIndexError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ignore_status() {
    let client = MockTransport::new(|_, body| Ok(respond(body, |_, _| 404)));
    let actions = vec![Action::delete("i", "1"), Action::delete("i", "2")];

    let stats = bulk(
        &client,
        actions,
        BulkOptions::default().with_ignore_status(vec![404]),
    )
    .await
    .unwrap();

    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.errors[0].status(), Some(404));
}

#[tokio::test]
async fn test_ignored_transport_status_is_not_raised() {
    let client = MockTransport::new(|_, _| Err(TransportError::new(409, "conflict")));
    let options = BulkOptions::default().with_ignore_status(vec![409]);

    let stats = bulk(&client, index_actions("i", 2), options).await.unwrap();
    assert_eq!(stats.failed, 2);
}

#[tokio::test]
async fn test_yield_ok_false_yields_only_failures() {
    let client = MockTransport::rejecting(&["3"]);
    let options = BulkOptions::default()
        .with_raise_on_error(false)
        .with_yield_ok(false);

    let outcomes: Vec<Outcome> = streaming_bulk(&client, index_actions("i", 5), options)
        .into_stream()
        .map(|outcome| outcome.unwrap())
        .collect()
        .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].id(), Some("3"));
}

#[tokio::test]
async fn test_write_params_and_custom_expander() {
    let client = MockTransport::accepting();
    let options = BulkOptions::default()
        .with_index("default-index")
        .with_refresh(Refresh::WaitFor)
        .with_require_alias(true)
        .expand_with(|action| {
            let mut expanded = expand_action(action);
            if expanded.id().is_none() {
                let mut meta = expanded.meta().clone();
                meta.insert("_id".to_string(), json!("generated"));
                expanded = ExpandedAction::new(
                    expanded.op_type().clone(),
                    meta,
                    expanded.payload().cloned(),
                );
            }
            expanded
        });
    assert_eq!(options.params.index.as_deref(), Some("default-index"));

    let action = Action::try_from(json!({ "title": "no id" })).unwrap();
    bulk(&client, vec![action], options).await.unwrap();

    let params = client.params();
    assert_eq!(params[0].refresh, Some(Refresh::WaitFor));
    assert_eq!(params[0].require_alias, Some(true));

    let sent = client.sent();
    assert_eq!(sent[0].id().as_deref(), Some("generated"));
    assert_eq!(sent[0].payload, Some(json!({ "title": "no id" })));
}

#[tokio::test(start_paused = true)]
async fn test_throttled_item_retried_once() {
    let client = MockTransport::new(|call, body| {
        Ok(respond(body, |n, _| if call == 0 && n == 1 { 429 } else { 201 }))
    });
    let options = BulkOptions::default().with_backoff(Backoff::new(
        1,
        Duration::from_secs(2),
        Duration::from_secs(600),
    ));

    let stats = bulk(&client, index_actions("i", 3), options).await.unwrap();

    assert_eq!(stats.succeeded, 3);
    assert_eq!(client.bulk_calls(), 2);
    let retried = common::sent_items(&client.bodies()[1]);
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].id().as_deref(), Some("1"));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_gives_up_after_max_retries() {
    let client = MockTransport::new(|_, body| Ok(respond(body, |_, _| 429)));
    let options = BulkOptions::default().with_backoff(Backoff::new(
        2,
        Duration::from_secs(2),
        Duration::from_secs(600),
    ));

    let start = tokio::time::Instant::now();
    let failures: Vec<Outcome> = backoff_bulk(&client, index_actions("i", 2), options)
        .into_stream()
        .map(|outcome| outcome.unwrap())
        .collect()
        .await;

    assert_eq!(client.bulk_calls(), 3);
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.status() == Some(429)));
    assert!(start.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_throttled_request_is_retried() {
    let client = MockTransport::new(|call, body| {
        if call == 0 {
            Err(TransportError::new(429, "Too Many Requests"))
        } else {
            Ok(respond(body, |_, _| 201))
        }
    });
    let options = BulkOptions::default().with_backoff(Backoff::new(
        3,
        Duration::from_millis(100),
        Duration::from_secs(1),
    ));

    let stats = bulk(&client, index_actions("i", 4), options).await.unwrap();

    assert_eq!(stats.succeeded, 4);
    assert_eq!(client.bulk_calls(), 2);
}

#[tokio::test]
async fn test_throttled_request_raised_without_retries() {
    let client = MockTransport::new(|_, _| Err(TransportError::new(429, "Too Many Requests")));
    let options = BulkOptions::default().with_raise_on_error(false);

    let mut stream = streaming_bulk(&client, index_actions("i", 2), options);

    match stream.next().await {
        Some(Err(e @ BulkError::Transport { .. })) => assert_eq!(e.status(), Some(429)),
        other => panic!("expected a transport error, got {:?}", other),
    }
    assert!(stream.next().await.is_none());
    assert_eq!(client.bulk_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_request_raised_after_last_retry() {
    let client = MockTransport::new(|_, _| Err(TransportError::new(429, "Too Many Requests")));
    let options = BulkOptions::default().with_backoff(Backoff::new(
        2,
        Duration::from_secs(1),
        Duration::from_secs(60),
    ));

    let result = bulk(&client, index_actions("i", 3), options).await;

    match result {
        Err(e @ BulkError::Transport { .. }) => assert_eq!(e.status(), Some(429)),
        other => panic!("expected a transport error, got {:?}", other),
    }
    assert_eq!(client.bulk_calls(), 3);
}

#[tokio::test]
async fn test_throttled_request_degrades_when_not_raising() {
    let client = MockTransport::new(|_, _| Err(TransportError::new(429, "Too Many Requests")));
    let options = BulkOptions::default()
        .with_raise_on_exception(false)
        .with_raise_on_error(false);

    let stats = bulk(&client, index_actions("i", 2), options).await.unwrap();

    assert_eq!(stats.failed, 2);
    assert!(stats.errors.iter().all(|e| e.status() == Some(429)));
}

#[tokio::test(start_paused = true)]
async fn test_index_error_deferred_until_last_retry() {
    let client = MockTransport::new(|_, body| {
        Ok(respond(body, |_, item| match item.id().as_deref() {
            Some("1") => 400,
            Some("2") => 429,
            _ => 201,
        }))
    });
    let options = BulkOptions::default().with_backoff(Backoff::new(
        2,
        Duration::from_secs(2),
        Duration::from_secs(600),
    ));

    let mut stream = streaming_bulk(&client, index_actions("i", 3), options);

    let first = stream.next().await.unwrap().unwrap();
    assert!(first.is_ok());
    assert_eq!(first.id(), Some("0"));

    match stream.next().await {
        Some(Err(BulkError::BulkIndex(e))) => {
            let failed: Vec<_> = e.errors.iter().map(|o| (o.id(), o.status())).collect();
            assert_eq!(failed, vec![(Some("1"), Some(400)), (Some("2"), Some(429))]);
        }
        other => panic!("expected BulkIndexError, got {:?}", other),
    }
    assert!(stream.next().await.is_none());
    assert_eq!(client.bulk_calls(), 3);

    let retried: Vec<_> = client.bodies()[1..]
        .iter()
        .flat_map(|body| common::sent_items(body))
        .map(|item| item.id())
        .collect();
    assert_eq!(retried, vec![Some("2".to_string()), Some("2".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_unlimited_backoff_retries_until_accepted() {
    let client = MockTransport::new(|call, body| {
        Ok(respond(body, |_, _| if call < 5 { 429 } else { 201 }))
    });
    let options = BulkOptions::default().with_backoff(Backoff::unlimited(
        Duration::from_millis(10),
        Duration::from_secs(1),
    ));

    let stats = bulk(&client, index_actions("i", 3), options).await.unwrap();

    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(client.bulk_calls(), 6);
}

#[tokio::test]
async fn test_throttling_without_backoff_is_a_plain_failure() {
    let client = MockTransport::new(|_, body| Ok(respond(body, |_, _| 429)));
    let options = BulkOptions::default().with_raise_on_error(false);

    let stats = bulk(&client, index_actions("i", 2), options).await.unwrap();

    assert_eq!(stats.failed, 2);
    assert_eq!(client.bulk_calls(), 1);
}

#[tokio::test]
async fn test_async_action_stream() {
    let client = MockTransport::accepting();
    let actions = futures::stream::iter(index_actions("i", 5));

    let mut stream = StreamingBulk::from_stream(&client, actions, BulkOptions::default());
    let mut count = 0;
    while let Some(outcome) = stream.next().await {
        assert!(outcome.unwrap().is_ok());
        count += 1;
    }
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_empty_input_sends_nothing() {
    let client = MockTransport::accepting();

    let stats = bulk(&client, Vec::new(), BulkOptions::default()).await.unwrap();

    assert_eq!(stats, BulkStats::default());
    assert_eq!(client.bulk_calls(), 0);
}
