//! # Container Lifecycle
//!
//! Ordering, failure collection and teardown across several modules.

#[cfg(test)]
mod tests {
    use crate::fixtures::{as_dyn, calls, HookLog, RecordingModule, SubscriberModule};
    use crate::init_test_logging;
    use blueprint_bus::BusError;
    use blueprint_runtime::{
        BlueprintContainer, ContainerConfig, ContainerError, LifecyclePhase, ModuleStatus,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn container() -> BlueprintContainer {
        init_test_logging();
        let container = BlueprintContainer::new(ContainerConfig::default());
        container.initialize().unwrap();
        container
    }

    /// contracts ← tasks ← finance, plus an unrelated safety module,
    /// registered in an order that differs from the dependency order.
    async fn load_site(container: &BlueprintContainer, log: &HookLog) {
        let modules = [
            RecordingModule::new("finance", log)
                .depending_on("contracts")
                .depending_on("tasks"),
            RecordingModule::new("safety", log),
            RecordingModule::new("tasks", log).depending_on("contracts"),
            RecordingModule::new("contracts", log),
        ];
        for module in modules {
            container.load_module(Arc::new(module)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_start_in_dependency_order_stop_in_reverse() {
        let log = HookLog::default();
        let container = container();
        load_site(&container, &log).await;

        container.start().await.unwrap();
        container.stop().await.unwrap();

        let started = calls(&log, LifecyclePhase::Start);
        assert_eq!(started, vec!["safety", "contracts", "tasks", "finance"]);

        let mut stopped = calls(&log, LifecyclePhase::Stop);
        stopped.reverse();
        assert_eq!(stopped, started);
    }

    #[tokio::test]
    async fn test_dependencies_ready_before_dependents_start() {
        let log = HookLog::default();
        let container = container();
        load_site(&container, &log).await;
        container.start().await.unwrap();

        let entries = log.lock().clone();
        let position = |entry: &str| entries.iter().position(|e| e == entry).unwrap();
        assert!(position("contracts:ready") < position("tasks:start"));
        assert!(position("tasks:ready") < position("finance:start"));
    }

    #[tokio::test]
    async fn test_failures_are_collected_per_batch() {
        let log = HookLog::default();
        let container = container();
        container
            .load_module(Arc::new(RecordingModule::new("a", &log).failing(LifecyclePhase::Stop)))
            .await
            .unwrap();
        container.load_module(Arc::new(RecordingModule::new("b", &log))).await.unwrap();
        container
            .load_module(Arc::new(RecordingModule::new("c", &log).failing(LifecyclePhase::Stop)))
            .await
            .unwrap();
        container.start().await.unwrap();

        let err = container.stop().await.unwrap_err();
        let failed: Vec<_> = err.failures().into_iter().map(|f| f.module_id).collect();
        assert_eq!(failed, vec!["c", "a"]);
        assert_eq!(calls(&log, LifecyclePhase::Stop), vec!["c", "b", "a"]);

        assert_eq!(container.module_status("a"), Some(ModuleStatus::Error));
        assert_eq!(container.module_status("b"), Some(ModuleStatus::Stopped));
        assert!(!container.is_running());

        // Disposal is still attempted for modules in ERROR.
        container.dispose().await.unwrap();
        assert_eq!(calls(&log, LifecyclePhase::Dispose), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_ready_failure_blocks_dependents_only() {
        let log = HookLog::default();
        let container = container();
        container
            .load_module(Arc::new(RecordingModule::new("contracts", &log).failing(LifecyclePhase::Ready)))
            .await
            .unwrap();
        container
            .load_module(Arc::new(RecordingModule::new("tasks", &log).depending_on("contracts")))
            .await
            .unwrap();
        container.load_module(Arc::new(RecordingModule::new("safety", &log))).await.unwrap();

        let err = container.start().await.unwrap_err();
        let failures = err.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].phase, LifecyclePhase::Ready);
        assert_eq!(failures[1].module_id, "tasks");

        assert_eq!(calls(&log, LifecyclePhase::Start), vec!["contracts", "safety"]);
        assert_eq!(calls(&log, LifecyclePhase::Stop), vec!["contracts"]);
        assert_eq!(container.module_status("contracts"), Some(ModuleStatus::Error));
        assert_eq!(container.module_status("tasks"), Some(ModuleStatus::Initialized));
        assert_eq!(container.module_status("safety"), Some(ModuleStatus::Ready));
        assert!(!container.is_running());
    }

    #[tokio::test]
    async fn test_dependent_starts_once_dependency_is_loaded() {
        let log = HookLog::default();
        let container = container();
        container
            .load_module(Arc::new(RecordingModule::new("tasks", &log).depending_on("contracts")))
            .await
            .unwrap();

        let err = container.start().await.unwrap_err();
        assert_eq!(err.failures()[0].module_id, "tasks");
        assert_eq!(container.module_status("tasks"), Some(ModuleStatus::Initialized));

        container.load_module(Arc::new(RecordingModule::new("contracts", &log))).await.unwrap();
        container.start().await.unwrap();

        assert!(container.is_running());
        assert_eq!(calls(&log, LifecyclePhase::Start), vec!["contracts", "tasks"]);
        assert_eq!(container.module_status("tasks"), Some(ModuleStatus::Running));
    }

    #[tokio::test]
    async fn test_dispose_twice_disposes_modules_once() {
        let container = container();
        let subscriber = Arc::new(SubscriberModule::new("subscriber"));
        container.load_module(as_dyn(&subscriber)).await.unwrap();
        container.start().await.unwrap();

        container.dispose().await.unwrap();
        container.dispose().await.unwrap();

        assert_eq!(subscriber.disposals(), 1);
        assert!(container.module_ids().is_empty());
        assert!(!container.is_running());
    }

    #[tokio::test]
    async fn test_dispose_shuts_the_bus_down() {
        let container = container();
        let bus = container.event_bus().unwrap();

        container.dispose().await.unwrap();

        assert!(matches!(
            bus.emit("TASK_CREATED", serde_json::Value::Null, "late"),
            Err(BusError::Closed)
        ));
        assert!(matches!(container.event_bus(), Err(ContainerError::Disposed)));
        assert!(matches!(container.start().await, Err(ContainerError::Disposed)));
    }

    #[tokio::test]
    async fn test_module_can_watch_its_dependency() {
        let log = HookLog::default();
        let container = container();
        container.load_module(Arc::new(RecordingModule::new("contracts", &log))).await.unwrap();

        let registry = container.execution_context().unwrap().registry().clone();
        let mut status = registry.watch_status("contracts").unwrap();
        assert_eq!(*status.borrow(), ModuleStatus::Initialized);

        container.start().await.unwrap();
        timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == ModuleStatus::Running),
        )
        .await
        .unwrap()
        .unwrap();

        let info = registry.info("contracts").unwrap();
        assert_eq!(info.status, ModuleStatus::Running);
        assert_eq!(registry.module_ids(), vec!["contracts"]);
    }

    #[tokio::test]
    async fn test_status_report_reflects_modules() {
        let log = HookLog::default();
        let container = container();
        load_site(&container, &log).await;
        container.start().await.unwrap();

        let report = container.status_report();
        assert_eq!(report["running"], true);
        let modules = report["modules"].as_array().unwrap();
        assert_eq!(modules.len(), 4);
        assert!(modules.iter().all(|m| m["status"] == "RUNNING"));
        assert_eq!(modules[0]["dependencies"], serde_json::json!(["contracts", "tasks"]));
    }
}
