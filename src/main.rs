// ==========================================
// 仓储定价运营系统 - 主入口
// ==========================================
// 职责: 初始化日志与配置，建立会话并完成首次门店拉取
// ==========================================

use facility_pricing_ops::app::{get_default_db_path, AppState};
use facility_pricing_ops::engine::FetchOutcome;
use facility_pricing_ops::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} - 调价暂存与发布引擎", facility_pricing_ops::APP_NAME);
    tracing::info!("系统版本: {}", facility_pricing_ops::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let app_state = AppState::new(db_path)?;
    tracing::info!("AppState初始化成功");

    let operator = std::env::args().nth(1);
    let api = app_state.start_session(operator.as_deref())?;

    match api.refresh_facilities().await? {
        FetchOutcome::Adopted { facility_count, total } => {
            tracing::info!(facility_count, total, "门店数据加载完成");
        }
        FetchOutcome::Stale => tracing::warn!("门店拉取结果已过期，未采用"),
    }

    let summary = api.staging_summary()?;
    tracing::info!(
        session_id = %summary.session_id,
        operator = %summary.operator,
        facilities = summary.facility_count,
        staged_units = summary.staged_units,
        "会话就绪"
    );

    app_state.end_session()?;
    Ok(())
}
