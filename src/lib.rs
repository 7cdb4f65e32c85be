pub mod agent_engine;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod mcp;
pub mod perception;
pub mod rag;
pub mod skills;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,seeclaw_core=debug";

/// Install the global fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(feature = "native")]
pub use native::{build_native_engine, build_reconfiguration};

#[cfg(feature = "native")]
mod native {
    use std::sync::Arc;

    use tokio::task::JoinHandle;

    use crate::agent_engine::engine::{AgentEngine, EngineDeps, EngineHandle, Reconfiguration};
    use crate::config::{AppConfig, PerceptionConfig};
    use crate::errors::SeeClawResult;
    use crate::executor::input::EnigoInput;
    use crate::llm::planner::Planner;
    use crate::llm::registry::{ProviderRegistry, Role};
    use crate::llm::tools::load_tools;
    use crate::mcp::McpRegistry;
    use crate::perception::pipeline::{PerceptionPipeline, SharedDetector};
    use crate::perception::screenshot::{ScreenCapturer, XcapCapturer};
    use crate::rag::experience::ExperienceStore;
    use crate::skills::manager::SkillsManager;

    /// Wire the real devices and services from `config` and spawn the engine.
    /// Must be called inside a Tokio runtime.
    pub async fn build_native_engine(config: &AppConfig) -> SeeClawResult<(EngineHandle, JoinHandle<()>)> {
        let Reconfiguration { planner, perception } = build_reconfiguration(config)?;

        let builtin_tools = load_tools(config.prompts.tools_file.as_deref())?;
        let extensions = McpRegistry::connect_all(&config.mcp).await;
        let skills = SkillsManager::load(&config.skills).await?;
        let experience = ExperienceStore::from_config(&config.experience)?;
        tracing::info!(
            tools = builtin_tools.len(),
            mcp_servers = ?extensions.server_names(),
            experience = %experience.path().display(),
            "engine dependencies ready"
        );

        Ok(AgentEngine::spawn(EngineDeps {
            perception,
            input: Arc::new(EnigoInput),
            planner,
            builtin_tools,
            prompts: config.prompts.clone(),
            extensions: Arc::new(extensions),
            skills: Arc::new(skills),
            experience: Arc::new(experience),
            run_log_dir: None,
        }))
    }

    /// Planner and perception pipeline for `config`. Used at startup and again
    /// whenever the UI saves an edited config.
    pub fn build_reconfiguration(config: &AppConfig) -> SeeClawResult<Reconfiguration> {
        config.validate()?;

        let registry = ProviderRegistry::from_config(&config.llm);
        let planner = Planner::new(registry.binding_for(Role::Planner)?, &config.planner);

        let capturer: Arc<dyn ScreenCapturer> = Arc::new(XcapCapturer::primary());
        let perception = PerceptionPipeline::new(capturer, load_detector(&config.perception), config.perception.clone())?;
        Ok(Reconfiguration { planner, perception })
    }

    #[cfg(feature = "yolo")]
    fn load_detector(config: &PerceptionConfig) -> Option<SharedDetector> {
        use std::sync::Mutex;

        use crate::perception::traits::ElementDetector;
        use crate::perception::yolo_detector::{default_ui_class_names, YoloDetector};

        let path = config.detector_model.as_ref()?;
        let classes = if config.detector_classes.is_empty() {
            default_ui_class_names()
        } else {
            config.detector_classes.clone()
        };
        match YoloDetector::load(path, classes, config.min_confidence) {
            Ok(detector) => {
                let boxed: Box<dyn ElementDetector> = Box::new(detector);
                Some(Arc::new(Mutex::new(boxed)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "element detector unavailable, using grid perception");
                None
            }
        }
    }

    #[cfg(not(feature = "yolo"))]
    fn load_detector(config: &PerceptionConfig) -> Option<SharedDetector> {
        if let Some(path) = &config.detector_model {
            tracing::warn!(model = %path.display(), "built without the `yolo` feature, detector ignored");
        }
        None
    }
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::{Emitter, Manager};

    use crate::agent_engine::event_bus::EngineEvent;

    init_tracing();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("no .env loaded: {e}");
    }

    let app_config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "cannot start without a valid config.toml");
            return;
        }
    };

    let result = tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            commands::ping,
            commands::get_version,
            commands::start_task,
            commands::stop_task,
            commands::confirm_action,
            commands::get_config,
            commands::save_config_ui,
        ])
        .setup(move |app| {
            let (engine, _task) = tauri::async_runtime::block_on(build_native_engine(&app_config))?;
            let mut events = engine.subscribe();
            app.manage(commands::AppState::new(engine, app_config));

            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                use tokio::sync::broadcast::error::RecvError;
                loop {
                    let event: EngineEvent = match events.recv().await {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "UI event forwarder lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if let EngineEvent::ApprovalRequired { request, .. } = &event {
                        let state = app_handle.state::<commands::AppState>();
                        *state.pending_action_type.lock().await = Some(request.action.type_name().to_string());
                    }
                    if let Err(e) = app_handle.emit(event.channel(), &event) {
                        tracing::warn!(channel = event.channel(), "emit failed: {e}");
                    }
                }
                tracing::info!("UI event forwarder exited");
            });
            Ok(())
        })
        .run(tauri::generate_context!());

    if let Err(e) = result {
        tracing::error!(error = %e, "SeeClaw application exited with an error");
    }
}
