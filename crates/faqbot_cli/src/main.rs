use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use faqbot_core::{
    derive_pairs, evaluate_cases, load_pairs_jsonl, load_records, save_pairs_jsonl,
    write_pairs_jsonl, BotConfig, EmbeddingProvider, EvalCase, FlowOutcome, GuidedFlow,
    HashEmbeddingProvider, KbCache, LazyEmbedder, MiniLmEmbeddingProvider, Record,
    ReplySelection, SupportBot, DEFAULT_EMBEDDING_DIM, DEFAULT_MODEL_ID,
    DEFAULT_REQUIRED_PASS_RATE, DEFAULT_THRESHOLD,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "faqbot", version)]
#[command(about = "Customer-support FAQ bot over threaded support conversations")]
struct Cli {
    /// Path to an all-MiniLM-L6-v2 .safetensors file. Requires --tokenizer-path.
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Path to the tokenizer.json matching --model-path.
    #[arg(long, global = true)]
    tokenizer_path: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SelectionArg {
    First,
    Last,
    All,
}

impl From<SelectionArg> for ReplySelection {
    fn from(arg: SelectionArg) -> Self {
        match arg {
            SelectionArg::First => ReplySelection::First,
            SelectionArg::Last => ReplySelection::Last,
            SelectionArg::All => ReplySelection::All,
        }
    }
}

#[derive(Debug, Args)]
struct CorpusArgs {
    /// Conversation CSV file. Repeat to concatenate several sources.
    #[arg(long = "input")]
    inputs: Vec<PathBuf>,

    /// Reply to keep when several answer the same message.
    #[arg(long, value_enum, default_value = "last")]
    selection: SelectionArg,

    /// JSONL question/answer pairs used instead of the built-in fallback.
    #[arg(long)]
    fallback: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Derive question/answer pairs and write them as JSONL.
    Pairs {
        #[arg(long = "input")]
        inputs: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "last")]
        selection: SelectionArg,
        /// Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Answer a single question.
    Ask {
        #[command(flatten)]
        corpus: CorpusArgs,
        #[arg(long)]
        question: String,
        #[arg(long)]
        json: bool,
    },
    /// Interactive session on stdin.
    Chat {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
    /// Run evaluation cases against the bot.
    Eval {
        #[command(flatten)]
        corpus: CorpusArgs,
        #[arg(long)]
        cases: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REQUIRED_PASS_RATE)]
        min_pass_rate: f32,
    },
    /// Describe the knowledge base that would be built.
    Stats {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn make_embedder(cli: &Cli) -> Result<Arc<dyn EmbeddingProvider>> {
    match (&cli.model_path, &cli.tokenizer_path) {
        (Some(model), Some(tokenizer)) => {
            let ext = model.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext != "safetensors" {
                bail!("unsupported model format '.{ext}' (expected .safetensors)");
            }
            let (model, tokenizer) = (model.clone(), tokenizer.clone());
            Ok(Arc::new(LazyEmbedder::new(DEFAULT_MODEL_ID, move || {
                let provider = MiniLmEmbeddingProvider::load(&model, &tokenizer)
                    .with_context(|| format!("load model {}", model.display()))?;
                Ok(Box::new(provider) as Box<dyn EmbeddingProvider>)
            })))
        }
        (None, None) => Ok(Arc::new(HashEmbeddingProvider::new(DEFAULT_EMBEDDING_DIM))),
        _ => bail!("--model-path and --tokenizer-path must both be provided"),
    }
}

fn read_eval_cases_json(path: &Path) -> Result<Vec<EvalCase>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let cases: Vec<EvalCase> = serde_json::from_reader(file).context("parse eval cases json")?;
    Ok(cases)
}

fn load_corpus(inputs: &[PathBuf]) -> Vec<Record> {
    let (records, report) = load_records(inputs);
    info!(
        records = records.len(),
        sources = report.sources,
        skipped_sources = report.skipped_sources,
        skipped_rows = report.skipped_rows,
        "corpus loaded"
    );
    records
}

fn make_bot(cli: &Cli, corpus: &CorpusArgs) -> Result<(SupportBot, usize)> {
    let embedder = make_embedder(cli)?;
    let records = load_corpus(&corpus.inputs);
    let seed = match &corpus.fallback {
        Some(path) => load_pairs_jsonl(path)
            .with_context(|| format!("load fallback pairs {}", path.display()))?,
        None => Vec::new(),
    };
    let config = BotConfig {
        threshold: corpus.threshold,
        selection: corpus.selection.into(),
        ..BotConfig::default()
    };
    let cache = KbCache::with_seed(seed);
    let bot = SupportBot::from_records(&records, embedder, config, &cache)?;
    Ok((bot, records.len()))
}

fn prompt_line<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    prompt: &str,
) -> Result<Option<String>> {
    write!(out, "{prompt}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn run_flow<R: BufRead, W: Write>(
    flow: &GuidedFlow,
    input: &mut R,
    out: &mut W,
) -> Result<Option<FlowOutcome>> {
    writeln!(out, "[{}]", flow.title)?;
    let mut values = HashMap::new();
    for field in flow.fields {
        let prompt = match field.placeholder {
            Some(hint) => format!("{} ({hint}): ", field.label),
            None => format!("{}: ", field.label),
        };
        let Some(value) = prompt_line(input, out, &prompt)? else {
            return Ok(None);
        };
        values.insert(field.key.to_string(), value);
    }
    Ok(Some(flow.submit(&values)))
}

fn chat_loop<R: BufRead, W: Write>(bot: &SupportBot, mut input: R, mut out: W) -> Result<()> {
    writeln!(
        out,
        "Customer Support Chatbot ({} answers loaded). Type 'quit' to leave.",
        bot.knowledge_base().len()
    )?;

    while let Some(query) = prompt_line(&mut input, &mut out, "You: ")? {
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "quit" | "exit") {
            break;
        }

        let reply = bot.reply(query)?;
        writeln!(out, "Bot: {}", reply.text)?;

        if let Some(flow) = GuidedFlow::for_intent(reply.intent) {
            match run_flow(flow, &mut input, &mut out)? {
                Some(outcome) => writeln!(out, "Bot: {}", outcome.message())?,
                None => break,
            }
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Pairs {
            inputs,
            selection,
            output,
        } => {
            let records = load_corpus(inputs);
            let pairs = derive_pairs(&records, (*selection).into());
            match output {
                Some(path) => {
                    save_pairs_jsonl(path, &pairs)
                        .with_context(|| format!("write {}", path.display()))?;
                    println!(
                        "records={} pairs={} output={}",
                        records.len(),
                        pairs.len(),
                        path.display()
                    );
                }
                None => write_pairs_jsonl(io::stdout().lock(), &pairs)?,
            }
        }
        Commands::Ask {
            corpus,
            question,
            json,
        } => {
            let (bot, _) = make_bot(&cli, corpus)?;
            let reply = bot.reply(question)?;

            if *json {
                println!("{}", serde_json::to_string(&reply)?);
            } else {
                match &reply.retrieval {
                    Some(r) => println!(
                        "intent={} decision={:?} score={:.4}",
                        reply.intent, r.decision, r.score
                    ),
                    None => println!("intent={} decision=none", reply.intent),
                }
                println!("answer={}", reply.text);
            }
        }
        Commands::Chat { corpus } => {
            let (bot, _) = make_bot(&cli, corpus)?;
            chat_loop(&bot, io::stdin().lock(), io::stdout().lock())?;
        }
        Commands::Eval {
            corpus,
            cases,
            min_pass_rate,
        } => {
            let run_id = format!("eval-{}", chrono::Utc::now().timestamp_millis());
            let (bot, _) = make_bot(&cli, corpus)?;
            let cases = read_eval_cases_json(cases)?;
            let summary = evaluate_cases(&bot, &cases)?;

            println!(
                "run_id={} model={} total={} passed={} failed={} pass_rate={:.4} required={:.4} meets_threshold={}",
                run_id,
                bot.knowledge_base().model_id(),
                summary.total,
                summary.passed,
                summary.failed,
                summary.pass_rate,
                min_pass_rate,
                summary.meets(*min_pass_rate)
            );

            for o in &summary.outcomes {
                println!(
                    "case={} passed={} intent={} decision={} score={} latency={:.1}ms",
                    o.case_id,
                    o.passed,
                    o.actual_intent,
                    o.actual_decision
                        .map(|d| format!("{d:?}"))
                        .unwrap_or_else(|| "none".to_string()),
                    o.score
                        .map(|s| format!("{s:.4}"))
                        .unwrap_or_else(|| "null".to_string()),
                    o.latency_ms
                );
            }

            if !summary.meets(*min_pass_rate) {
                bail!(
                    "pass rate {:.4} below required {:.4}",
                    summary.pass_rate,
                    min_pass_rate
                );
            }
        }
        Commands::Stats { corpus } => {
            let (bot, records) = make_bot(&cli, corpus)?;
            let summary = bot.knowledge_base().summary();
            println!(
                "records={} source={} pairs={} dim={} model={} built_at={}",
                records,
                summary.source.as_str(),
                summary.pairs,
                summary.dim,
                summary.model_id,
                summary.built_at.to_rfc3339()
            );
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
