use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "chaos-cli")]
#[command(about = "Control CLI for the JSON-RPC chaos proxy", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, env = "CHAOS_PROXY_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

/// Rule target: an exact method name or a regular expression.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Target {
    #[arg(long)]
    method: Option<String>,

    #[arg(long)]
    pattern: Option<String>,
}

impl Target {
    fn into_json(self) -> Map<String, Value> {
        let mut body = Map::new();
        if let Some(method) = self.method {
            body.insert("method".into(), Value::String(method));
        }
        if let Some(pattern) = self.pattern {
            body.insert("pattern".into(), Value::String(pattern));
        }
        body
    }
}

/// Probabilities for random selection; must sum to 1.
#[derive(Args)]
struct Probs {
    #[arg(long, default_value_t = 0.0)]
    forward: f64,

    #[arg(long, default_value_t = 0.0)]
    not_answer: f64,

    #[arg(long, default_value_t = 0.0)]
    fail: f64,
}

impl Probs {
    fn to_json(&self) -> Value {
        json!({ "forward": self.forward, "not_answer": self.not_answer, "fail": self.fail })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show proxy status and current delays
    Status,
    /// Show rules and default configuration
    Rules,
    /// Add a deterministic rule with a behavior queue
    AddRule {
        #[command(flatten)]
        target: Target,
        /// Behaviors in order (forward, not_answer, fail)
        #[arg(required = true)]
        behaviors: Vec<String>,
    },
    /// Add a random rule
    AddRandomRule {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        probs: Probs,
    },
    /// Queue one more behavior on an existing deterministic rule
    Push {
        #[command(flatten)]
        target: Target,
        behavior: String,
    },
    /// Remove every rule
    ClearRules,
    /// Switch the default to deterministic mode
    DefaultDeterministic,
    /// Switch the default to random mode
    DefaultRandom {
        #[command(flatten)]
        probs: Probs,
    },
    /// Append a behavior to the default queue
    Queue { behavior: String },
    /// Empty the default queue
    ClearQueue,
    /// Set injected delays in milliseconds
    Delays {
        #[arg(long)]
        pre: Option<u64>,
        #[arg(long)]
        post: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();
    let url = |path: &str| format!("{}{}", base, path);

    let request = match cli.command {
        Commands::Status => client.get(url("/admin/status")),
        Commands::Rules => client.get(url("/admin/rules")),
        Commands::AddRule { target, behaviors } => {
            let mut body = target.into_json();
            body.insert("behaviors".into(), json!(behaviors));
            client.post(url("/admin/rules")).json(&body)
        }
        Commands::AddRandomRule { target, probs } => {
            let mut body = target.into_json();
            body.insert("probs".into(), probs.to_json());
            client.post(url("/admin/rules")).json(&body)
        }
        Commands::Push { target, behavior } => {
            let mut body = target.into_json();
            body.insert("behavior".into(), Value::String(behavior));
            client.post(url("/admin/rules/push")).json(&body)
        }
        Commands::ClearRules => client.delete(url("/admin/rules")),
        Commands::DefaultDeterministic => client
            .put(url("/admin/default"))
            .json(&json!({ "mode": "deterministic" })),
        Commands::DefaultRandom { probs } => client
            .put(url("/admin/default"))
            .json(&json!({ "mode": "random", "probs": probs.to_json() })),
        Commands::Queue { behavior } => client
            .post(url("/admin/default/queue"))
            .json(&json!({ "behavior": behavior })),
        Commands::ClearQueue => client.delete(url("/admin/default/queue")),
        Commands::Delays { pre, post } => client
            .put(url("/admin/delays"))
            .json(&json!({ "pre_ms": pre, "post_ms": post })),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
