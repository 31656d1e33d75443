use log::{error, info};
use std::fs;

use churnbench::{run_scenario, Config, RemoteCluster, TcpWorkbenchClient, Timers};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let config = Config::from_env()?;
    info!(
        "Running {} against workbench at {}",
        config.scenario, config.workbench_address
    );

    // The driver blocks on this runtime from the main thread, so it must
    // not run on one of its workers.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let timers = Timers::new(config.options.time_scale);
    let cancel = timers.cancel_handle();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling pending waits");
            cancel.cancel();
        }
    });

    let client = TcpWorkbenchClient::new(config.workbench_address.clone());
    let cluster = RemoteCluster::connect(client, runtime.handle().clone())?;

    let report = run_scenario(config.scenario, &cluster, &config.options, &timers);
    if let Some(e) = &report.error {
        error!("Scenario ended early: {}", e);
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &config.report_path {
        Some(path) => {
            fs::write(path, json)?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    runtime.shutdown_background();
    Ok(())
}
