//! Choparia Caixa - Tauri v2 Backend
//!
//! Daily till reconciliation for the choparia: the React frontend calls
//! the IPC commands registered here via `@tauri-apps/api/core::invoke()`.
//! All data lives in a local SQLite database.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod aggregate;
mod auth;
mod commands;
mod db;
mod error;
mod export;
mod fields;
mod logging;
mod money;
mod sales;

pub fn run() {
    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,choparia_caixa_lib=debug"));

    logging::prune_old_logs();

    let log_dir = logging::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "caixa");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes logs.
    // We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);

    info!(
        "Starting Choparia Caixa v{} (build {} at {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_SHA"),
        env!("BUILD_TIMESTAMP"),
    );

    tauri::Builder::default()
        .setup(|app| {
            use tauri::Manager;

            let app_data_dir = app
                .path()
                .app_data_dir()
                .expect("Failed to get app data dir");

            let db_state = db::init(&app_data_dir).expect("Failed to initialize database");
            app.manage(db_state);
            app.manage(auth::AuthState::new());

            info!("Database and auth state registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Auth
            commands::auth::auth_login,
            commands::auth::auth_logout,
            commands::auth::auth_get_session,
            commands::auth::auth_validate_session,
            commands::auth::auth_track_activity,
            commands::auth::auth_system_initialized,
            commands::auth::auth_bootstrap_admin,
            // Users
            commands::auth::users_create,
            commands::auth::users_list,
            commands::auth::users_delete,
            // Sales
            commands::sales::sales_preview,
            commands::sales::sales_create,
            commands::sales::sales_update,
            commands::sales::sales_delete,
            commands::sales::sales_get,
            commands::sales::sales_list,
            commands::sales::sales_recent,
            // Reports
            commands::reports::report_period,
            commands::reports::report_export_csv,
            commands::reports::report_history_csv,
            commands::reports::dashboard_summary,
        ])
        .run(tauri::generate_context!())
        .expect("error while running Choparia Caixa");
}
