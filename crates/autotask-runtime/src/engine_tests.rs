    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use autotask_protocols::{
        ErrorMatcher, HandlerError, ParameterSchema, RetryPolicy, TaskHandler, handler_fn,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::Instant;

    fn engine(definitions: Vec<TaskDefinition>) -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(TaskRegistry::load(definitions).unwrap()))
    }

    fn echo() -> Arc<dyn TaskHandler> {
        handler_fn(|params, _| async move { Ok(params) })
    }

    /// Fails `failures` times with `message`, then succeeds.
    fn flaky(failures: u32, message: &'static str) -> (Arc<dyn TaskHandler>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < failures {
                    Err(HandlerError::new(message))
                } else {
                    Ok(json!({ "calls": n + 1 }))
                }
            }
        });
        (handler, calls)
    }

    #[tokio::test]
    async fn test_execute_success() {
        let engine = engine(vec![TaskDefinition::new("echo", "", echo())]);
        let out = engine.execute("echo", json!({"a": 1}), "exec-1").await.unwrap();
        assert_eq!(out, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unknown_task_type() {
        let engine = engine(vec![]);
        let err = engine.execute("missing-type", json!({}), "exec-1").await.unwrap_err();
        assert!(matches!(err, TaskError::UnknownTaskType(_)));
    }

    #[test]
    fn test_prepare_merges_defaults() {
        let mut defaults = Map::new();
        defaults.insert("format".to_string(), json!("pdf"));
        defaults.insert("pages".to_string(), json!(1));
        let engine = engine(vec![
            TaskDefinition::new("report", "", echo()).with_default_parameters(defaults),
        ]);

        let prepared = engine.prepare("report", json!({"pages": 5})).unwrap();
        assert_eq!(prepared.task_type(), "report");
        assert_eq!(prepared.parameters, json!({"format": "pdf", "pages": 5}));
    }

    #[test]
    fn test_prepare_null_parameters() {
        let engine = engine(vec![TaskDefinition::new("echo", "", echo())]);
        let prepared = engine.prepare("echo", Value::Null).unwrap();
        assert_eq!(prepared.parameters, json!({}));
    }

    #[test]
    fn test_prepare_rejects_non_object() {
        let engine = engine(vec![TaskDefinition::new("echo", "", echo())]);
        let err = engine.prepare("echo", json!([1, 2])).unwrap_err();
        assert!(matches!(err, TaskError::InvalidParameters { .. }));
    }

    #[test]
    fn test_prepare_schema_violation() {
        let schema = ParameterSchema::compile(json!({
            "type": "object",
            "properties": { "count": { "type": "integer" } },
            "required": ["count"]
        }))
        .unwrap();
        let engine = engine(vec![
            TaskDefinition::new("count", "", echo()).with_parameters_schema(schema),
        ]);

        assert!(engine.prepare("count", json!({"count": 3})).is_ok());
        let err = engine.prepare("count", json!({"count": "three"})).unwrap_err();
        match err {
            TaskError::InvalidParameters { task_type, .. } => assert_eq!(task_type, "count"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_parameters_not_retried() {
        let (handler, calls) = flaky(0, "unused");
        let schema = ParameterSchema::compile(json!({"type": "object", "required": ["id"]})).unwrap();
        let engine = engine(vec![
            TaskDefinition::new("job", "", handler)
                .with_parameters_schema(schema)
                .with_retry_policy(RetryPolicy::new(3, 10, 10)),
        ]);

        let err = engine.execute("job", json!({}), "exec-1").await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidParameters { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_without_policy() {
        let (handler, calls) = flaky(5, "boom");
        let engine = engine(vec![TaskDefinition::new("job", "", handler)]);

        let err = engine.execute("job", json!({}), "exec-1").await.unwrap_err();
        match err {
            TaskError::HandlerError { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_panic_is_handler_error() {
        let handler = handler_fn(|_, _| async {
            if true {
                panic!("handler exploded");
            }
            Ok(json!(null))
        });
        let engine = engine(vec![TaskDefinition::new("job", "", handler)]);

        let err = engine.execute("job", json!({}), "exec-1").await.unwrap_err();
        assert!(matches!(err, TaskError::HandlerError { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_at_deadline() {
        let finished = Arc::new(AtomicU32::new(0));
        let flag = finished.clone();
        let handler = handler_fn(move |_, _| {
            let flag = flag.clone();
            async move {
                sleep(Duration::from_secs(10)).await;
                flag.store(1, Ordering::SeqCst);
                Ok(json!("late"))
            }
        });
        let engine = engine(vec![TaskDefinition::new("slow", "", handler).with_timeout_ms(100)]);

        let start = Instant::now();
        let err = engine.execute("slow", json!({}), "exec-1").await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(
            err,
            TaskError::ExecutionTimeout { timeout_ms: 100, .. }
        ));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        // The timed-out handler is detached, not cancelled.
        sleep(Duration::from_secs(11)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_then_exhausted() {
        let calls: Arc<Mutex<Vec<(Instant, String, u32)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let handler = handler_fn(move |_, ctx| {
            log.lock().push((Instant::now(), ctx.execution_id.clone(), ctx.attempt));
            async { Err(HandlerError::new("ECONNRESET")) }
        });
        let engine = engine(vec![
            TaskDefinition::new("sync", "", handler).with_retry_policy(RetryPolicy::new(3, 1_000, 30_000)),
        ]);

        let err = engine.execute("sync", json!({}), "exec-1").await.unwrap_err();
        match err {
            TaskError::ExhaustedRetries {
                retries, last_error, ..
            } => {
                assert_eq!(retries, 3);
                assert_eq!(last_error, "ECONNRESET");
            }
            other => panic!("unexpected error: {other}"),
        }

        let calls = calls.lock();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].0 - w[0].0).collect();
        for (gap, expected_ms) in gaps.iter().zip([1_000u64, 2_000, 4_000]) {
            assert!(*gap >= Duration::from_millis(expected_ms));
            assert!(*gap < Duration::from_millis(expected_ms + 10));
        }

        let ids: Vec<&str> = calls.iter().map(|c| c.1.as_str()).collect();
        assert_eq!(
            ids,
            vec!["exec-1", "exec-1-retry-1", "exec-1-retry-2", "exec-1-retry-3"]
        );
        assert_eq!(calls[3].2, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let (handler, calls) = flaky(2, "ECONNRESET");
        let engine = engine(vec![
            TaskDefinition::new("sync", "", handler).with_retry_policy(RetryPolicy::new(3, 50, 1_000)),
        ]);

        let out = engine.execute("sync", json!({}), "exec-1").await.unwrap();
        assert_eq!(out, json!({"calls": 3}));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_matching_error_not_retried() {
        let (handler, calls) = flaky(5, "validation failed");
        let policy = RetryPolicy::new(3, 10, 100)
            .with_retryable_errors(vec![ErrorMatcher::substring("ECONNRESET")]);
        let engine = engine(vec![TaskDefinition::new("sync", "", handler).with_retry_policy(policy)]);

        let err = engine.execute("sync", json!({}), "exec-1").await.unwrap_err();
        assert!(matches!(err, TaskError::HandlerError { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pattern_matcher_retries() {
        let (handler, calls) = flaky(1, "upstream Timed Out");
        let policy = RetryPolicy::new(2, 10, 100)
            .with_retryable_errors(vec![ErrorMatcher::pattern("(?i)timed? ?out").unwrap()]);
        let engine = engine(vec![TaskDefinition::new("sync", "", handler).with_retry_policy(policy)]);

        assert!(engine.execute("sync", json!({}), "exec-1").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_mid_chain_ends_chain() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(HandlerError::new("ECONNRESET"))
                } else {
                    Err(HandlerError::new("permission denied"))
                }
            }
        });
        let policy = RetryPolicy::new(3, 10, 100)
            .with_retryable_errors(vec![ErrorMatcher::substring("ECONNRESET")]);
        let engine = engine(vec![TaskDefinition::new("sync", "", handler).with_retry_policy(policy)]);

        let err = engine.execute("sync", json!({}), "exec-1").await.unwrap_err();
        match err {
            TaskError::HandlerError { message, .. } => assert_eq!(message, "permission denied"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    sleep(Duration::from_secs(5)).await;
                }
                Ok(json!("done"))
            }
        });
        let engine = engine(vec![
            TaskDefinition::new("slow", "", handler)
                .with_timeout_ms(100)
                .with_retry_policy(RetryPolicy::new(1, 10, 10)),
        ]);

        let out = engine.execute("slow", json!({}), "exec-1").await.unwrap();
        assert_eq!(out, json!("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_exhausts_immediately() {
        let (handler, calls) = flaky(5, "boom");
        let engine = engine(vec![
            TaskDefinition::new("job", "", handler).with_retry_policy(RetryPolicy::new(0, 10, 10)),
        ]);

        let err = engine.execute("job", json!({}), "exec-1").await.unwrap_err();
        assert!(matches!(err, TaskError::ExhaustedRetries { retries: 0, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
