    use super::*;
    use autotask_protocols::{RetryPolicy, handler_fn};
    use serde_json::json;

    fn definition(task_type: &str) -> TaskDefinition {
        TaskDefinition::new(
            task_type,
            format!("{} task", task_type),
            handler_fn(|_, _| async { Ok(json!(null)) }),
        )
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = TaskRegistry::load(vec![definition("noop"), definition("report")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert!(registry.contains("noop"));

        let def = registry.lookup("report").unwrap();
        assert_eq!(def.task_type, "report");
        assert_eq!(def.description, "report task");
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = TaskRegistry::load(vec![definition("noop")]).unwrap();
        let err = registry.lookup("missing-type").unwrap_err();
        assert!(matches!(err, TaskError::UnknownTaskType(ref t) if t == "missing-type"));
    }

    #[test]
    fn test_duplicate_task_type() {
        let result = TaskRegistry::load(vec![definition("noop"), definition("noop")]);
        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateTaskType("noop".to_string())
        );
    }

    #[test]
    fn test_empty_task_type_rejected() {
        let result = TaskRegistry::load(vec![definition("  ")]);
        assert!(matches!(
            result,
            Err(RegistryError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = TaskRegistry::load(vec![definition("noop").with_timeout_ms(0)]);
        assert!(matches!(
            result,
            Err(RegistryError::InvalidDefinition { ref task_type, .. }) if task_type == "noop"
        ));
    }

    #[test]
    fn test_inverted_retry_delays_rejected() {
        let def = definition("sync").with_retry_policy(RetryPolicy::new(3, 5_000, 1_000));
        assert!(TaskRegistry::load(vec![def]).is_err());
    }

    #[test]
    fn test_empty_registry() {
        let registry = TaskRegistry::load(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.task_types().is_empty());
    }

    #[test]
    fn test_task_types_sorted() {
        let registry =
            TaskRegistry::load(vec![definition("zeta"), definition("alpha"), definition("mid")])
                .unwrap();
        assert_eq!(registry.task_types(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_cron_schedules() {
        let registry = TaskRegistry::load(vec![
            definition("hourly").with_cron_schedule("0 * * * *"),
            definition("manual"),
        ])
        .unwrap();
        assert_eq!(
            registry.cron_schedules(),
            vec![("hourly".to_string(), "0 * * * *".to_string())]
        );
    }

    #[test]
    fn test_definitions_snapshot() {
        let mut defaults = serde_json::Map::new();
        defaults.insert("format".to_string(), json!("pdf"));
        let registry = TaskRegistry::load(vec![
            definition("report")
                .with_default_parameters(defaults)
                .with_timeout_ms(500),
            definition("noop"),
        ])
        .unwrap();

        let infos = registry.definitions();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].task_type, "noop");
        assert_eq!(infos[1].timeout_ms, 500);
        assert_eq!(infos[1].default_parameters["format"], "pdf");
    }

    #[tokio::test]
    async fn test_resolved_handler_runs() {
        let registry = TaskRegistry::load(vec![definition("noop")]).unwrap();
        let def = registry.lookup("noop").unwrap();
        let out = def
            .handler
            .handle(json!({}), autotask_protocols::HandlerContext::new("noop", "exec-1", 0))
            .await
            .unwrap();
        assert_eq!(out, json!(null));
    }
