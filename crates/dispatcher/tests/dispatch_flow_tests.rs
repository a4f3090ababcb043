use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use herqles_auth::{AuthBackends, AuthorizationService};
use herqles_core::config::{AssignmentConfig, IdentityConfig};
use herqles_core::models::{
    Action, NewJob, NewJobTarget, NewTask, Task, TaskFilter, TaskStatus, TaskStatusReport,
};
use herqles_core::traits::{Binding, MessageBus, Route, StatusChange, TaskRepository};
use herqles_core::{HerqlesError, HerqlesResult, ServiceContext};
use herqles_dispatcher::{control_plane_handlers, ReportOutcome, SubscriberSet, TaskDispatcher};
use herqles_infrastructure::{sqlite_context, DatabaseManager, InMemoryMessageBus, RpcClient};
use serde_json::{json, Value};
use tokio::sync::mpsc;

struct Harness {
    _db: DatabaseManager,
    ctx: ServiceContext,
    bus: Arc<InMemoryMessageBus>,
    rpc: RpcClient,
    auth: AuthBackends,
    subscribers: SubscriberSet,
}

async fn harness() -> Harness {
    harness_with(|ctx| ctx).await
}

/// 允许测试替换上下文中的仓储
async fn harness_with(wrap: impl FnOnce(ServiceContext) -> ServiceContext) -> Harness {
    let db = DatabaseManager::in_memory().await.unwrap();
    let bus = Arc::new(InMemoryMessageBus::new());
    let ctx = wrap(sqlite_context(&db, bus.clone(), Duration::from_millis(500)));

    let auth = AuthBackends::load(&ctx, &IdentityConfig::default(), &AssignmentConfig::default())
        .await
        .unwrap();

    let mut subscribers = SubscriberSet::new(bus.clone());
    subscribers
        .start_all(control_plane_handlers(
            &ctx,
            AuthorizationService::new(auth.assignment.clone()),
        ))
        .await
        .unwrap();

    Harness {
        rpc: RpcClient::new(bus.clone(), Duration::from_secs(2)),
        _db: db,
        ctx,
        bus,
        auth,
        subscribers,
    }
}

/// 前若干次读取失败的任务仓储，模拟数据库短暂不可用
struct FlakyTasks {
    inner: Arc<dyn TaskRepository>,
    failures: AtomicUsize,
    reads: AtomicUsize,
}

impl FlakyTasks {
    fn wrap(inner: Arc<dyn TaskRepository>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: AtomicUsize::new(failures),
            reads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TaskRepository for FlakyTasks {
    async fn find_by_id(&self, id: i64) -> HerqlesResult<Option<Task>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(HerqlesError::internal("连接池耗尽"));
        }
        self.inner.find_by_id(id).await
    }

    async fn list(&self, filter: &TaskFilter) -> HerqlesResult<Vec<Task>> {
        self.inner.list(filter).await
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: TaskStatus,
        change: &StatusChange,
    ) -> HerqlesResult<bool> {
        self.inner.compare_and_set_status(id, expected, change).await
    }
}

/// 模拟Worker：应答存活探测，可选地接收运行指令
async fn spawn_worker(
    bus: Arc<InMemoryMessageBus>,
    target: &str,
    framework: &str,
    accept_runs: bool,
) -> mpsc::UnboundedReceiver<Value> {
    let exchange = format!("worker-{target}");
    let mut alive = bus
        .subscribe(&Binding::new(
            exchange.clone(),
            format!("alive-{framework}"),
            format!("{target}-{framework}-alive"),
        ))
        .await
        .unwrap();

    let responder = bus.clone();
    tokio::spawn(async move {
        while let Some(Ok(delivery)) = alive.next().await {
            responder
                .reply_to(
                    delivery.reply_to.as_deref().unwrap(),
                    delivery.correlation_id.as_deref().unwrap(),
                    &json!({"alive": true}),
                )
                .await
                .unwrap();
            delivery.ack().await.unwrap();
        }
    });

    let (sender, receiver) = mpsc::unbounded_channel();
    if accept_runs {
        let mut runs = bus
            .subscribe(&Binding::new(
                exchange,
                format!("run-{framework}"),
                format!("{target}-{framework}-run"),
            ))
            .await
            .unwrap();
        tokio::spawn(async move {
            while let Some(Ok(delivery)) = runs.next().await {
                let command: Value = delivery.json().unwrap();
                delivery.ack().await.unwrap();
                let _ = sender.send(command);
            }
        });
    }
    receiver
}

async fn register(h: &Harness, target: &str, framework: &str) -> Value {
    h.rpc
        .call(
            &Route::new("worker", "register"),
            &json!({
                "target": target,
                "framework": framework,
                "datacenter": "dc1",
                "tags": {"a": "b"}
            }),
        )
        .await
        .unwrap()
}

async fn create_task(h: &Harness, worker_id: i64) -> i64 {
    let mut arguments = serde_json::Map::new();
    arguments.insert("cmd".to_string(), json!("echo hi"));

    let job_id = h
        .ctx
        .jobs
        .create(&NewJob {
            name: "deploy".to_string(),
            datacenter: "dc1".to_string(),
            targets: vec![NewJobTarget {
                worker_id,
                tags: None,
                tasks: vec![NewTask {
                    name: "t1".to_string(),
                    actions: vec![
                        Action {
                            processor: "shell".to_string(),
                            arguments: Some(arguments),
                        },
                        Action {
                            processor: "noop".to_string(),
                            arguments: None,
                        },
                    ],
                }],
            }],
        })
        .await
        .unwrap();

    let job = h.ctx.jobs.find_by_id(job_id).await.unwrap().unwrap();
    job.targets[0].tasks[0].id
}

async fn launch(h: &Harness, task_id: i64, worker_id: Value) -> Value {
    h.rpc
        .call(
            &Route::new("task", "launch"),
            &json!({"task_id": task_id, "worker_id": worker_id}),
        )
        .await
        .unwrap()
}

async fn report(h: &Harness, task_id: i64, status: &str) {
    h.bus
        .send(
            &Route::new("task", "task_status"),
            &json!({"task_id": task_id, "status": status}),
        )
        .await
        .unwrap();
}

async fn wait_for_status(h: &Harness, task_id: i64, expected: TaskStatus) {
    for _ in 0..100 {
        let task = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
        if task.status == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("任务 {task_id} 未进入 {expected}");
}

#[tokio::test]
async fn test_register_launch_and_complete() {
    let h = harness().await;

    assert_eq!(register(&h, "w1", "f1").await, json!({"id": "1"}));
    assert_eq!(register(&h, "w1", "f1").await, json!({"id": "1"}));

    let mut runs = spawn_worker(h.bus.clone(), "w1", "f1", true).await;
    let task_id = create_task(&h, 1).await;

    let reply = launch(&h, task_id, json!("1")).await;
    assert_eq!(reply, json!({"status": "STARTING", "code": 200}));

    let command = tokio::time::timeout(Duration::from_secs(2), runs.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        command,
        json!({
            "id": task_id,
            "name": "t1",
            "actions": [
                {"processor": "shell", "arguments": {"cmd": "echo hi"}},
                {"processor": "noop", "arguments": {}}
            ]
        })
    );

    report(&h, task_id, "RUNNING").await;
    wait_for_status(&h, task_id, TaskStatus::Running).await;

    report(&h, task_id, "FINISHED").await;
    wait_for_status(&h, task_id, TaskStatus::Finished).await;

    let task = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
    assert!(task.stopped_at.is_some());

    // 迟到的RUNNING上报不改变终态
    report(&h, task_id, "RUNNING").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Finished);
    assert_eq!(after.stopped_at, task.stopped_at);

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_second_launch_conflicts_without_mutation() {
    let h = harness().await;
    register(&h, "w1", "f1").await;
    let _runs = spawn_worker(h.bus.clone(), "w1", "f1", true).await;
    let task_id = create_task(&h, 1).await;

    launch(&h, task_id, json!(1)).await;
    let before = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();

    let reply = launch(&h, task_id, json!(1)).await;
    assert_eq!(reply["code"], json!(409));
    assert!(reply["error"].is_string());

    let after = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Starting);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(after.stopped_at, before.stopped_at);

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_unreachable_worker_leaves_task_pending() {
    let h = harness().await;
    register(&h, "w2", "f2").await;
    let task_id = create_task(&h, 1).await;

    let reply = launch(&h, task_id, json!(1)).await;
    assert_eq!(reply["code"], json!(503));

    let task = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let reply = launch(&h, 9999, json!(1)).await;
    assert_eq!(reply["code"], json!(404));
    let reply = launch(&h, task_id, json!(42)).await;
    assert_eq!(reply["code"], json!(404));

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_failed_run_publish_restores_status() {
    let h = harness().await;
    register(&h, "w3", "f3").await;
    // 应答存活探测但没有绑定运行队列
    let _runs = spawn_worker(h.bus.clone(), "w3", "f3", false).await;
    let task_id = create_task(&h, 1).await;

    let reply = launch(&h, task_id, json!(1)).await;
    assert_eq!(reply["code"], json!(503));

    let task = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_worker_get_and_framework_register() {
    let h = harness().await;
    register(&h, "w1", "f1").await;
    register(&h, "w2", "f1").await;
    register(&h, "w3", "other").await;

    let reply = h
        .rpc
        .call(
            &Route::new("worker", "get"),
            &json!({"framework": "f1", "datacenter": "dc1"}),
        )
        .await
        .unwrap();
    let workers = reply["workers"].as_array().unwrap();
    assert_eq!(workers.len(), 2);
    assert_eq!(workers[0]["target"], json!("w1"));
    assert_eq!(workers[1]["tags"], json!({"a": "b"}));

    h.bus
        .send(
            &Route::new("worker", "reload"),
            &json!({"target": "w1", "framework": "f1", "tags": {"a": "z"}}),
        )
        .await
        .unwrap();

    let reply = h
        .rpc
        .call(&Route::new("framework", "register"), &json!({}))
        .await
        .unwrap();
    assert_eq!(reply["id"].as_str().unwrap().len(), 36);

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_security_validate_over_bus() {
    let h = harness().await;
    let issued = h.auth.assignment.issue_token("admin", false).await.unwrap();

    let reply = h
        .rpc
        .call(
            &Route::new("security", "validate"),
            &json!({"token": issued.token, "permission": "herqles.job.get"}),
        )
        .await
        .unwrap();
    assert_eq!(reply["code"], json!(200));
    assert_eq!(reply["user"]["name"], json!("admin"));

    let reply = h
        .rpc
        .call(&Route::new("security", "validate"), &json!({"token": "bogus"}))
        .await
        .unwrap();
    assert_eq!(reply["code"], json!(403));

    let reply = h
        .rpc
        .call(&Route::new("security", "validate"), &json!({"nope": 1}))
        .await
        .unwrap();
    assert_eq!(reply["code"], json!(400));

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_status_reports_are_guarded() {
    let h = harness().await;
    register(&h, "w1", "f1").await;
    let task_id = create_task(&h, 1).await;
    let dispatcher = TaskDispatcher::new(&h.ctx);

    let unknown = dispatcher
        .report_status(&TaskStatusReport {
            task_id: 9999,
            status: "RUNNING".to_string(),
            message: None,
        })
        .await
        .unwrap();
    assert_eq!(unknown, ReportOutcome::UnknownTask);

    let rejected = dispatcher
        .report_status(&TaskStatusReport {
            task_id,
            status: "RUNNING".to_string(),
            message: None,
        })
        .await
        .unwrap();
    assert!(matches!(rejected, ReportOutcome::Rejected { current: TaskStatus::Pending, .. }));

    let garbage = dispatcher
        .report_status(&TaskStatusReport {
            task_id,
            status: "EXPLODED".to_string(),
            message: None,
        })
        .await
        .unwrap();
    assert!(matches!(garbage, ReportOutcome::Rejected { .. }));

    let failed = dispatcher
        .report_status(&TaskStatusReport {
            task_id,
            status: "FAILED".to_string(),
            message: Some("disk full".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(failed, ReportOutcome::Applied(TaskStatus::Failed));

    let task = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(task.error_message.as_deref(), Some("disk full"));
    assert!(task.stopped_at.is_some());

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_status_report_survives_transient_store_failure() {
    let flaky = Arc::new(std::sync::Mutex::new(None));
    let captured = flaky.clone();
    let h = harness_with(move |mut ctx| {
        let tasks = FlakyTasks::wrap(ctx.tasks.clone(), 0);
        *captured.lock().unwrap() = Some(tasks.clone());
        ctx.tasks = tasks;
        ctx
    })
    .await;
    let flaky = flaky.lock().unwrap().take().unwrap();
    register(&h, "w1", "f1").await;
    let task_id = create_task(&h, 1).await;
    assert!(h
        .ctx
        .tasks
        .compare_and_set_status(
            task_id,
            TaskStatus::Pending,
            &StatusChange::to(TaskStatus::Starting)
        )
        .await
        .unwrap());

    flaky.failures.store(1, Ordering::SeqCst);
    report(&h, task_id, "RUNNING").await;

    // 绕过故障包装轮询，第一次读取失败后消息被重投
    let mut status = TaskStatus::Starting;
    for _ in 0..100 {
        status = flaky.inner.find_by_id(task_id).await.unwrap().unwrap().status;
        if status == TaskStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, TaskStatus::Running);
    assert_eq!(flaky.failures.load(Ordering::SeqCst), 0);
    assert_eq!(flaky.reads.load(Ordering::SeqCst), 2);

    h.subscribers.stop_all().await;
}

#[tokio::test]
async fn test_concurrent_launches_start_task_once() {
    let h = harness().await;
    register(&h, "w1", "f1").await;
    let mut runs = spawn_worker(h.bus.clone(), "w1", "f1", true).await;
    let task_id = create_task(&h, 1).await;

    let first = TaskDispatcher::new(&h.ctx);
    let second = first.clone();
    let (a, b) = tokio::join!(first.launch(task_id, 1), second.launch(task_id, 1));

    let results = [a, b];
    let started = results
        .iter()
        .filter(|r| matches!(r, Ok(TaskStatus::Starting)))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(HerqlesError::StateConflict(_))))
        .count();
    assert_eq!((started, conflicts), (1, 1));

    let command = tokio::time::timeout(Duration::from_secs(1), runs.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(command["id"], json!(task_id));
    assert!(tokio::time::timeout(Duration::from_millis(200), runs.recv())
        .await
        .is_err());

    let task = h.ctx.tasks.find_by_id(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Starting);

    h.subscribers.stop_all().await;
}
