use clap::Parser;
use pearl_lsp::{server::Backend, IncludeMode, ServerConfig};
use tower_lsp::{LspService, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args);

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) =
        LspService::new(|client| Backend::new_with_config(client, config.clone()));
    Server::new(stdin, stdout, socket).serve(service).await;
}

#[derive(Parser, Debug)]
#[command(name = "pearl-lsp")]
struct Args {
    /// Predefine a preprocessor macro (NAME or NAME=VALUE); repeatable.
    #[arg(long = "define", value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Resolve #include paths relative to the workspace root instead of the
    /// including file's directory.
    #[arg(long)]
    workspace_includes: bool,
}

fn build_config(args: &Args) -> ServerConfig {
    let mut config = ServerConfig::default();
    for define in &args.defines {
        match define.split_once('=') {
            Some((name, value)) => {
                config.defines.insert(name.to_string(), value.to_string());
            }
            None => {
                config.defines.insert(define.clone(), String::new());
            }
        }
    }
    if args.workspace_includes {
        config.include_mode = IncludeMode::WorkspaceRelative;
    }
    config
}
