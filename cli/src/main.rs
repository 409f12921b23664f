use clap::Parser;
use tau_cli::Cli;

fn main() -> anyhow::Result<()> {
    tau_arg0::arg0_dispatch_or_else(|linux_sandbox_exe| async move {
        tau_cli::init_tracing();
        let cli = Cli::parse();
        tau_cli::run(cli, linux_sandbox_exe).await
    })
}
