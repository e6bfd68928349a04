/// 事故哨兵 (Accident Sentinel)
///
/// 车辆碰撞/火情实时监控服务
///
/// 系统架构:
/// 1. 采集线程: 读帧 → 检测 → 跟踪 → 事件判定 → 推流
/// 2. 告警线程: 证据保存 / 位置解析 / 通知 / 记录
/// 3. HTTP:     视频流 / 状态 / 启停控制 (tokio + axum)
///
/// 主程序入口 - 直接运行: cargo run --bin sentinel --release
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use accident_sentinel::alert::{
    AlertDispatcher, AlertServices, EvidenceStore, JsonlRecordStore, LocationResolver,
};
use accident_sentinel::detection::{ByteTracker, HttpDetector};
use accident_sentinel::events::EventEvaluator;
use accident_sentinel::pipeline::{CycleServices, Engine, Pipeline};
use accident_sentinel::status::{EventHistory, LoggingObserver, StatusStore};
use accident_sentinel::stream::MjpegBroadcaster;
use accident_sentinel::web_api::{self, AppState};
use accident_sentinel::Args;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accident_sentinel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("🚀 事故哨兵启动 v{}", env!("CARGO_PKG_VERSION"));
    info!("📹 输入: {:?} | 推理服务: {}", args.input, args.detector_url);

    // ========== 告警 ==========
    let evidence = EvidenceStore::new(&args.evidence_dir);
    evidence
        .prepare()
        .with_context(|| format!("无法创建证据目录 {}", args.evidence_dir.display()))?;

    let resolver = Arc::new(LocationResolver::new(
        args.geocoder(),
        args.latitude,
        args.longitude,
    ));
    let status = Arc::new(StatusStore::new());
    status.register(Arc::new(LoggingObserver));

    let dispatcher = Arc::new(AlertDispatcher::new(
        args.alert_config(),
        AlertServices {
            evidence,
            resolver: resolver.clone(),
            notifier: args.notifier(),
            records: Box::new(JsonlRecordStore::new(&args.records)),
            status: status.clone(),
        },
    )?);

    // 后台预热地址缓存, 采集线程只读缓存
    {
        let resolver = resolver.clone();
        std::thread::spawn(move || {
            let location = resolver.resolve();
            info!("📍 摄像头位置: {}", location);
        });
    }

    // ========== 流水线 ==========
    let engine = Engine {
        detector: Box::new(HttpDetector::from_config(&args.detector_config())),
        tracker: Box::new(ByteTracker::default()),
        evaluator: EventEvaluator::new(args.evaluator_config()),
    };
    let services = CycleServices {
        status,
        history: Arc::new(EventHistory::default()),
        stream: Arc::new(MjpegBroadcaster::default()),
        dispatcher: dispatcher.clone(),
        resolver,
    };
    let pipeline = Arc::new(Pipeline::new(
        args.pipeline_config(),
        args.source_factory()?,
        engine,
        services,
    ));

    // ========== HTTP ==========
    let app = web_api::create_router(AppState::new(pipeline.clone(), args.web_config()));
    let addr = args.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;
    info!("✅ 监听 http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(pipeline.clone()))
        .await?;

    // 等待已入队的告警处理完
    tokio::task::spawn_blocking(move || dispatcher.shutdown()).await?;
    info!("🛑 服务已退出");
    Ok(())
}

/// Ctrl-C 后先停止流水线, 视频流连接随之结束, 服务才能平滑退出
async fn shutdown_signal(pipeline: Arc<Pipeline>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ 无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 收到退出信号, 停止检测...");
    if let Err(e) = tokio::task::spawn_blocking(move || pipeline.stop()).await {
        error!("❌ 停止检测失败: {}", e);
    }
}
