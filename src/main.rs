use clap::Parser;

use pycodestyle_lsp::config::Settings;
use pycodestyle_lsp::lsp::server::run_server;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Command used to launch pycodestyle (repeat for `python3 -m pycodestyle`)
    #[arg(long = "path", value_name = "ARG", allow_hyphen_values = true)]
    path: Vec<String>,

    /// Extra argument passed to pycodestyle (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Communicate over stdin/stdout (the only supported transport)
    #[arg(long)]
    stdio: bool,
}

impl Cli {
    fn into_settings(self) -> Settings {
        let mut settings = Settings::default();
        if !self.path.is_empty() {
            settings.path = self.path;
        }
        settings.args = self.args;
        settings
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if !cli.stdio {
        eprintln!("pycodestyle-lsp: no transport given, using stdio");
    }
    run_server(cli.into_settings()).await
}
