//! Control plane behavior tests

use pulse_config::{ControlSettings, RoutingStrategyKind};
use pulse_control::prelude::*;
use pulse_control::PluginStatus;
use pulse_core::{
    ConfigDataNode, ConfigPolicyNode, ConfigPolicyTree, ConfigTable, ConfigValue, MetricId,
    Namespace, PluginKey, PluginType, Rule, LATEST_VERSION,
};
use pulse_plugin_api::testing::{MockCollector, MockPublisher, MockSupervisor, RecordingEmitter};
use pulse_plugin_api::{ControlEvent, PluginClient, PluginDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

fn cpu_temp() -> Namespace {
    Namespace::from(["cpu", "temp"])
}

fn tempcol(version: i32) -> PluginDescriptor {
    let policy = ConfigPolicyTree::new().with_node(
        &["cpu", "temp"],
        ConfigPolicyNode::new()
            .with_rule(Rule::string("unit").with_default("celsius"))
            .with_rule(Rule::integer("interval").with_min(1.0)),
    );
    PluginDescriptor::new(
        "tempcol",
        version,
        PluginType::Collector,
        format!("/opt/plugins/tempcol-{version}"),
    )
    .with_metric(["cpu", "temp"], 1)
    .with_metric(["cpu", "temp"], 2)
    .with_policy(policy)
}

fn loadcol() -> PluginDescriptor {
    PluginDescriptor::new("loadcol", 1, PluginType::Collector, "/opt/plugins/loadcol")
        .with_metric(["cpu", "load"], 1)
}

fn file_publisher() -> PluginDescriptor {
    let policy = ConfigPolicyTree::new().with_node(
        &[],
        ConfigPolicyNode::new().with_rule(Rule::string("file").required()),
    );
    PluginDescriptor::new("file", 1, PluginType::Publisher, "/opt/plugins/file").with_policy(policy)
}

struct Fixture {
    control: Control,
    supervisor: MockSupervisor,
    emitter: RecordingEmitter,
}

fn fixture_with(settings: ControlSettings) -> Fixture {
    let supervisor = MockSupervisor::new()
        .with_plugin(tempcol(1))
        .with_plugin(tempcol(2))
        .with_plugin(loadcol())
        .with_plugin(file_publisher());
    let emitter = RecordingEmitter::new();
    let control = Control::builder(Arc::new(supervisor.clone()))
        .settings(settings)
        .emitter(Arc::new(emitter.clone()))
        .build();
    control.start();

    Fixture {
        control,
        supervisor,
        emitter,
    }
}

fn fixture() -> Fixture {
    fixture_with(ControlSettings::default())
}

fn register_collector(control: &Control, key: &PluginKey, collector: &MockCollector) {
    control
        .available_plugins()
        .register(key.clone(), PluginClient::Collector(Arc::new(collector.clone())))
        .unwrap();
}

fn soon() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

#[tokio::test]
async fn test_collect_then_unload_owner() {
    let f = fixture();
    let key = PluginKey::new("tempcol", 2);
    let collector = MockCollector::new("tempcol-2");

    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    register_collector(&f.control, &key, &collector);

    let ids = [MetricId::latest(cpu_temp())];
    let metrics = f.control.collect_metrics(&ids, soon()).await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].version, 2);
    assert_eq!(metrics[0].data["source"], "tempcol-2");
    assert_eq!(collector.call_count(), 1);

    f.control.unload(&key).await.unwrap();

    let errors = f.control.collect_metrics(&ids, soon()).await.unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0].kind(),
        ErrorKind::NotFound | ErrorKind::ResourceUnavailable
    ));
    assert_eq!(collector.call_count(), 1);
}

#[tokio::test]
async fn test_subscription_count_stays_non_negative() {
    let f = fixture();
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    let id = MetricId::new(cpu_temp(), 2);

    f.control
        .subscribe_metric_type(&id, &ConfigDataNode::new())
        .await
        .unwrap();
    f.control
        .subscribe_metric_type(&id, &ConfigDataNode::new())
        .await
        .unwrap();
    f.control.unsubscribe_metric_type(&id).await.unwrap();
    f.control.unsubscribe_metric_type(&id).await.unwrap();

    let err = f.control.unsubscribe_metric_type(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    let metric = f.control.catalog().get(&cpu_temp(), 2).unwrap();
    assert_eq!(metric.subscriptions(), 0);
}

#[tokio::test]
async fn test_subscription_attaches_normalized_config() {
    let f = fixture();
    let key = PluginKey::new("tempcol", 2);
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();

    let config = ConfigDataNode::new().with_item("interval", 5i64);
    let metric = f
        .control
        .subscribe_metric_type(&MetricId::latest(cpu_temp()), &config)
        .await
        .unwrap();

    let attached = metric.config().unwrap();
    assert_eq!(attached["unit"], ConfigValue::from("celsius"));
    assert_eq!(attached["interval"], ConfigValue::Int(5));
    assert_eq!(metric.subscriptions(), 1);
    assert_eq!(metric.plugin().unwrap().key(), key);
}

#[tokio::test]
async fn test_rejected_subscription_reports_every_violation() {
    let f = fixture();
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    let events_before = f.emitter.events().len();

    let config = ConfigDataNode::new()
        .with_item("unit", 3i64)
        .with_item("interval", 0i64);
    let err = f
        .control
        .subscribe_metric_type(&MetricId::latest(cpu_temp()), &config)
        .await
        .unwrap_err();

    match err {
        ControlError::Validation(errors) => assert_eq!(errors.len(), 2),
        other => panic!("expected validation error, got {other}"),
    }

    let metric = f.control.catalog().get(&cpu_temp(), LATEST_VERSION).unwrap();
    assert_eq!(metric.subscriptions(), 0);
    assert!(metric.config().is_none());
    assert_eq!(f.emitter.events().len(), events_before);
}

#[tokio::test]
async fn test_swap_rolls_back_when_unload_fails() {
    let f = fixture();
    let old = f.control.load("/opt/plugins/tempcol-1").await.unwrap();
    let old_key = old.key();
    f.supervisor.fail_unload(old_key.clone(), "process busy");

    let err = f
        .control
        .swap_plugins("/opt/plugins/tempcol-2", &*old)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::Plugin(_)));

    let keys: Vec<_> = f.control.plugin_catalog().iter().map(|p| p.key()).collect();
    assert_eq!(keys, vec![old_key.clone()]);
    assert_eq!(
        f.supervisor.unload_calls(),
        vec![old_key.clone(), PluginKey::new("tempcol", 2)]
    );
    assert_eq!(old.current_status(), PluginStatus::Loaded);

    // The outgoing plugin still owns its metrics
    let owner = f.control.catalog().get_plugin(&cpu_temp(), 1).unwrap();
    assert_eq!(owner.key(), old_key);
}

#[tokio::test]
async fn test_swap_reports_both_errors_when_rollback_fails() {
    let f = fixture();
    let old = f.control.load("/opt/plugins/tempcol-1").await.unwrap();
    f.supervisor.fail_unload(old.key(), "process busy");
    f.supervisor
        .fail_unload(PluginKey::new("tempcol", 2), "process wedged");

    let err = f
        .control
        .swap_plugins("/opt/plugins/tempcol-2", &*old)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RollbackFailure);
    let msg = err.to_string();
    assert!(msg.contains("process busy"));
    assert!(msg.contains("process wedged"));

    // Neither side was removed
    assert_eq!(f.control.plugin_catalog().len(), 2);
    assert!(!f
        .emitter
        .events()
        .iter()
        .any(|e| matches!(e, ControlEvent::PluginsSwapped { .. })));
}

#[tokio::test]
async fn test_swap_replaces_plugin() {
    let f = fixture();
    let old = f.control.load("/opt/plugins/tempcol-1").await.unwrap();

    f.control
        .swap_plugins("/opt/plugins/tempcol-2", &*old)
        .await
        .unwrap();

    let keys: Vec<_> = f.control.plugin_catalog().iter().map(|p| p.key()).collect();
    assert_eq!(keys, vec![PluginKey::new("tempcol", 2)]);
    assert!(f.emitter.events().contains(&ControlEvent::PluginsSwapped {
        loaded: "tempcol:2".to_string(),
        unloaded: "tempcol:1".to_string(),
    }));
}

#[tokio::test]
async fn test_collection_is_fail_closed() {
    let f = fixture();
    let healthy = MockCollector::new("tempcol-2");
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    f.control.load("/opt/plugins/loadcol").await.unwrap();
    register_collector(&f.control, &PluginKey::new("tempcol", 2), &healthy);

    let ids = [
        MetricId::latest(cpu_temp()),
        MetricId::latest(["cpu", "load"]),
    ];
    let errors = f.control.collect_metrics(&ids, soon()).await.unwrap_err();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::ResourceUnavailable);
}

#[tokio::test]
async fn test_failing_instance_voids_batch() {
    let f = fixture();
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    f.control.load("/opt/plugins/loadcol").await.unwrap();
    register_collector(
        &f.control,
        &PluginKey::new("tempcol", 2),
        &MockCollector::new("tempcol-2"),
    );
    register_collector(
        &f.control,
        &PluginKey::new("loadcol", 1),
        &MockCollector::new("loadcol").failing("sensor offline"),
    );

    let ids = [
        MetricId::latest(cpu_temp()),
        MetricId::latest(["cpu", "load"]),
    ];
    let errors = f.control.collect_metrics(&ids, soon()).await.unwrap_err();

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ControlError::RemoteInvocation { .. }));
    assert!(errors[0].to_string().contains("sensor offline"));
}

#[tokio::test(start_paused = true)]
async fn test_collection_deadline() {
    let f = fixture();
    let slow = MockCollector::new("tempcol-2").with_delay(Duration::from_secs(30));
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    register_collector(&f.control, &PluginKey::new("tempcol", 2), &slow);

    let deadline = Instant::now() + Duration::from_millis(50);
    let errors = f
        .control
        .collect_metrics(&[MetricId::latest(cpu_temp())], deadline)
        .await
        .unwrap_err();

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ControlError::Timeout { .. }));
}

#[tokio::test]
async fn test_groups_run_in_one_batch() {
    let f = fixture();
    let temp = MockCollector::new("tempcol-2");
    let load = MockCollector::new("loadcol");
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    f.control.load("/opt/plugins/loadcol").await.unwrap();
    register_collector(&f.control, &PluginKey::new("tempcol", 2), &temp);
    register_collector(&f.control, &PluginKey::new("loadcol", 1), &load);

    let ids = [
        MetricId::new(cpu_temp(), 1),
        MetricId::new(cpu_temp(), 2),
        MetricId::latest(["cpu", "load"]),
    ];
    let metrics = f.control.collect(&ids).await.unwrap();

    assert_eq!(metrics.len(), 3);
    assert_eq!(temp.call_count(), 1);
    assert_eq!(load.call_count(), 1);
}

#[tokio::test]
async fn test_round_robin_spreads_collections() {
    let f = fixture();
    let key = PluginKey::new("tempcol", 2);
    let a = MockCollector::new("a");
    let b = MockCollector::new("b");
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    register_collector(&f.control, &key, &a);
    register_collector(&f.control, &key, &b);

    let ids = [MetricId::latest(cpu_temp())];
    f.control.collect(&ids).await.unwrap();
    f.control.collect(&ids).await.unwrap();

    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);

    let stats = f.control.available_plugins().stats();
    assert!(stats.iter().all(|s| s.hit_count == 1));
}

#[tokio::test]
async fn test_least_hits_strategy_from_settings() {
    let f = fixture_with(ControlSettings {
        routing_strategy: RoutingStrategyKind::LeastHits,
        ..ControlSettings::default()
    });
    let key = PluginKey::new("tempcol", 2);
    let busy = MockCollector::new("busy");
    let idle = MockCollector::new("idle");
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    register_collector(&f.control, &key, &busy);
    register_collector(&f.control, &key, &idle);

    let first = f.control.available_plugins().stats()[0].id;
    let instance = f
        .control
        .available_plugins()
        .collectors
        .get_plugin_pool(&key)
        .unwrap()
        .instances()
        .into_iter()
        .find(|i| i.id() == first)
        .unwrap();
    for _ in 0..3 {
        instance.record_hit();
    }

    f.control.collect(&[MetricId::latest(cpu_temp())]).await.unwrap();
    assert_eq!(busy.call_count(), 0);
    assert_eq!(idle.call_count(), 1);
}

#[tokio::test]
async fn test_unload_revokes_subscriptions_and_drains_pool() {
    let f = fixture();
    let key = PluginKey::new("tempcol", 2);
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    register_collector(&f.control, &key, &MockCollector::new("tempcol-2"));
    f.control
        .subscribe_metric_type(&MetricId::latest(cpu_temp()), &ConfigDataNode::new())
        .await
        .unwrap();

    f.control.unload(&key).await.unwrap();

    assert!(!f.control.metric_exists(&cpu_temp(), LATEST_VERSION));
    assert!(f.control.metric_catalog().is_empty());
    let pool = f
        .control
        .available_plugins()
        .collectors
        .get_plugin_pool(&key)
        .unwrap();
    assert_eq!(pool.count(), 0);
    assert!(f.supervisor.running().is_empty());
}

#[tokio::test]
async fn test_unload_of_unknown_plugin() {
    let f = fixture();
    let err = f
        .control
        .unload(&PluginKey::new("missing", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_publish_routes_to_publisher() {
    let f = fixture();
    let publisher = MockPublisher::new();
    f.control.load("/opt/plugins/file").await.unwrap();
    f.control
        .available_plugins()
        .register(
            PluginKey::new("file", 1),
            PluginClient::Publisher(Arc::new(publisher.clone())),
        )
        .unwrap();

    let mut config = ConfigTable::new();
    config.insert("file".to_string(), ConfigValue::from("/tmp/out"));
    f.control
        .publish_metrics("pulse.json", b"[1,2]", "file", 1, &config)
        .await
        .unwrap();

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].content_type, "pulse.json");
    assert_eq!(published[0].content, b"[1,2]".to_vec());
    assert_eq!(published[0].config, config);
}

#[tokio::test]
async fn test_publish_failures() {
    let f = fixture();
    f.control.load("/opt/plugins/file").await.unwrap();
    let err = f
        .control
        .publish_metrics("pulse.json", b"[]", "file", 1, &ConfigTable::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);

    f.control
        .available_plugins()
        .register(
            PluginKey::new("file", 1),
            PluginClient::Publisher(Arc::new(MockPublisher::new().failing("disk full"))),
        )
        .unwrap();
    let err = f
        .control
        .publish_metrics("pulse.json", b"[]", "file", 1, &ConfigTable::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteInvocation);
}

#[tokio::test]
async fn test_subscribe_publisher() {
    let f = fixture();
    f.control.load("/opt/plugins/file").await.unwrap();
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();

    let err = f
        .control
        .subscribe_publisher("file", 1, &ConfigTable::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::Validation(ref errors) if errors.len() == 1));

    let err = f
        .control
        .subscribe_publisher("tempcol", 2, &ConfigTable::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::InvalidPluginType { .. }));

    let err = f
        .control
        .subscribe_publisher("missing", LATEST_VERSION, &ConfigTable::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut config = ConfigTable::new();
    config.insert("file".to_string(), ConfigValue::from("/tmp/out"));
    let normalized = f
        .control
        .subscribe_publisher("file", LATEST_VERSION, &config)
        .await
        .unwrap();
    assert_eq!(normalized, config);
    assert!(f.emitter.events().contains(&ControlEvent::PublisherSubscribed {
        name: "file".to_string(),
        version: 1,
    }));
}

#[tokio::test]
async fn test_calls_require_started() {
    let f = fixture();
    f.control.stop();

    let err = f.control.load("/opt/plugins/tempcol-2").await.unwrap_err();
    assert!(matches!(err, ControlError::NotStarted("load")));

    let errors = f
        .control
        .collect(&[MetricId::latest(cpu_temp())])
        .await
        .unwrap_err();
    assert!(matches!(errors[0], ControlError::NotStarted(_)));

    assert!(f.supervisor.running().is_empty());
    assert!(f.emitter.events().is_empty());
}

#[tokio::test]
async fn test_events_follow_successful_calls_only() {
    let f = fixture();
    let mut rx = f.control.events().subscribe();
    f.supervisor.fail_load("/opt/plugins/loadcol", "exec format error");

    assert!(f.control.load("/opt/plugins/loadcol").await.is_err());
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();

    assert_eq!(
        f.emitter.events(),
        vec![ControlEvent::PluginLoaded {
            name: "tempcol".to_string(),
            version: 2,
            plugin_type: PluginType::Collector,
        }]
    );
    assert!(matches!(
        rx.recv().await.unwrap(),
        ControlEvent::PluginLoaded { version: 2, .. }
    ));
}

#[tokio::test]
async fn test_autoload_skips_failures() {
    let f = fixture();
    let loaded = f
        .control
        .autoload(&["/opt/plugins/tempcol-1", "/opt/plugins/unknown", "/opt/plugins/file"])
        .await;

    let keys: Vec<_> = loaded.iter().map(|p| p.key().to_string()).collect();
    assert_eq!(keys, vec!["tempcol:1", "file:1"]);
}

#[tokio::test]
async fn test_catalog_views() {
    let f = fixture();
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    f.control.load("/opt/plugins/loadcol").await.unwrap();

    assert_eq!(f.control.metric_catalog().len(), 3);
    assert_eq!(f.control.fetch_metrics(&Namespace::from(["cpu"])).unwrap().len(), 3);
    assert!(f.control.metric_exists(&cpu_temp(), 1));
    assert!(!f.control.metric_exists(&cpu_temp(), 3));

    let plugins = f.control.plugin_catalog();
    assert_eq!(plugins.len(), 2);
    assert_eq!(plugins[0].name(), "loadcol");
    assert_eq!(plugins[1].type_name(), "collector");
    assert_eq!(plugins[1].status(), "loaded");
    assert!(plugins[1].loaded_timestamp() > 0);
}

#[tokio::test]
async fn test_swap_rollback_leaves_incoming_unroutable() {
    let f = fixture();
    let old = f.control.load("/opt/plugins/tempcol-1").await.unwrap();
    let old_collector = MockCollector::new("tempcol-1");
    let new_collector = MockCollector::new("tempcol-2");
    register_collector(&f.control, &old.key(), &old_collector);
    register_collector(&f.control, &PluginKey::new("tempcol", 2), &new_collector);
    f.supervisor.fail_unload(old.key(), "process busy");

    assert!(f
        .control
        .swap_plugins("/opt/plugins/tempcol-2", &*old)
        .await
        .is_err());

    let incoming = f
        .control
        .available_plugins()
        .collectors
        .get_plugin_pool(&PluginKey::new("tempcol", 2))
        .map_or(0, |pool| pool.count());
    assert_eq!(incoming, 0);

    let metrics = f.control.collect(&[MetricId::latest(cpu_temp())]).await.unwrap();
    assert_eq!(metrics[0].data["source"], "tempcol-1");
    assert_eq!(new_collector.call_count(), 0);
}

fn metric_plugin(n: usize) -> PluginDescriptor {
    PluginDescriptor::new(
        format!("p{n}"),
        1,
        PluginType::Collector,
        format!("/opt/plugins/p{n}"),
    )
    .with_metric([format!("m{n}").as_str()], 1)
    .with_metric(["shared"], 1)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unloads_leave_nothing_behind() {
    const PLUGINS: usize = 24;

    for _ in 0..20 {
        let supervisor = (0..PLUGINS).fold(MockSupervisor::new(), |s, n| {
            s.with_plugin(metric_plugin(n))
        });
        let control = Arc::new(Control::new(Arc::new(supervisor.clone())));
        control.start();
        for n in 0..PLUGINS {
            control.load(format!("/opt/plugins/p{n}")).await.unwrap();
        }
        assert_eq!(control.metric_catalog().len(), PLUGINS + 1);

        let mut tasks = JoinSet::new();
        for n in 0..PLUGINS {
            let control = Arc::clone(&control);
            tasks.spawn(async move {
                let key = PluginKey::new(&format!("p{n}"), 1);
                control.unload(&key).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert!(control.plugin_catalog().is_empty());
        assert!(control.metric_catalog().is_empty());
        assert!(!control.metric_exists(&Namespace::from(["shared"]), 1));
        assert!(supervisor.running().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscriptions_keep_exact_count() {
    const CALLERS: usize = 50;

    let f = fixture();
    f.control.load("/opt/plugins/tempcol-2").await.unwrap();
    let control = Arc::new(f.control);
    let id = MetricId::new(cpu_temp(), 2);

    for _ in 0..CALLERS {
        control
            .subscribe_metric_type(&id, &ConfigDataNode::new())
            .await
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for n in 0..CALLERS * 2 {
        let control = Arc::clone(&control);
        let id = id.clone();
        tasks.spawn(async move {
            if n % 2 == 0 {
                control
                    .subscribe_metric_type(&id, &ConfigDataNode::new())
                    .await
                    .map(|_| ())
            } else {
                control.unsubscribe_metric_type(&id).await
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let metric = control.catalog().get(&cpu_temp(), 2).unwrap();
    assert_eq!(metric.subscriptions(), CALLERS as u64);

    let mut tasks = JoinSet::new();
    for _ in 0..CALLERS * 2 {
        let control = Arc::clone(&control);
        let id = id.clone();
        tasks.spawn(async move { control.unsubscribe_metric_type(&id).await });
    }
    let (mut released, mut violations) = (0, 0);
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(()) => released += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::InvariantViolation);
                violations += 1;
            }
        }
    }

    assert_eq!(released, CALLERS);
    assert_eq!(violations, CALLERS);
    assert_eq!(metric.subscriptions(), 0);
}
