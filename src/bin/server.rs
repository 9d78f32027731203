use clap::Parser;
use cartfree::config::{Ctx, Env, setup_tracing};
use cartfree::launch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Env::parse();
    let ctx = Ctx::load_files(&env.config, &env.secrets)?;

    let telemetry_guard = if let Some(telemetry) = ctx.telemetry() {
        match telemetry.setup_telemetry() {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("Failed to setup telemetry: {e}");
                setup_tracing(ctx.log_level);
                None
            }
        }
    } else {
        setup_tracing(ctx.log_level);
        None
    };

    let result = launch(ctx).await;

    // Flush pending spans before the process exits.
    drop(telemetry_guard);

    result
}
