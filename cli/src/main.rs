use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Once};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sav_core::engine::{RuleRegistry, command_count};
use sav_core::rules::SAVE_FILE;
use sav_core::stream::enforce_counts;
use sav_core::{ChunkedTransform, EngineOptions, Input, TransformationEngine};
use serde_json::Value;
use tracing::{debug, info};


static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "sav_core=warn,sav_cli=warn";
const VERBOSE_TRACE_FILTER: &str = "sav_core=debug,sav_cli=debug";

#[derive(Debug, Parser)]
#[command(name = "sav", author, version, about = "Convert save files to JSON and back", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,

    /// Engine options file (TOML)
    #[arg(long, global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Fail when a counted list is shorter than declared
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode a save file into JSON.
    Decode {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        /// Output file; stdout when omitted
        #[arg(short, long, value_name = "OUT", value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Encode a JSON document back into a save file.
    Encode {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        #[arg(short, long, value_name = "OUT", value_parser = parse_sanitized_path)]
        output: PathBuf,
    },
    /// List the compiled rules and their command counts.
    Rules,
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

/// Filter expression carried by `SAV_LOG`. Plain toggles map to the
/// verbose preset; anything else is taken as an `EnvFilter` directive.
fn filter_expr_from(raw: &str) -> Option<String> {
    if !env_toggle_enabled(raw) {
        return None;
    }
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("1") || trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("on") {
        Some(VERBOSE_TRACE_FILTER.to_string())
    } else {
        Some(trimmed.to_string())
    }
}

fn init_tracing() {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = std::env::var("SAV_LOG")
            .ok()
            .and_then(|raw| filter_expr_from(&raw))
            .or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn resolve_options(config: Option<&Path>, strict: bool) -> anyhow::Result<EngineOptions> {
    let mut options = match config {
        Some(path) => EngineOptions::load(path)?,
        None => EngineOptions::default(),
    };
    if strict {
        options.strict_counts = true;
    }
    Ok(options)
}

fn new_engine(registry: &Arc<RuleRegistry>, options: EngineOptions) -> TransformationEngine {
    TransformationEngine::with_registry(SAVE_FILE, registry.clone()).with_options(options)
}

fn decode(
    registry: &Arc<RuleRegistry>,
    options: EngineOptions,
    input: &Path,
    output: Option<&Path>,
    pretty: bool,
) -> anyhow::Result<()> {
    let file = File::open(input).with_context(|| format!("Failed to open '{}'", input.display()))?;
    let mut stream = ChunkedTransform::new(new_engine(registry, options))?;
    let read = stream.read_from(BufReader::new(file))?;
    debug!(bytes = read, input = %input.display(), "read save file");

    let out = stream
        .finish()
        .with_context(|| format!("Failed to decode '{}'", input.display()))?;
    let document = out
        .output
        .into_document()
        .context("decoding did not produce a document")?;

    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?;
            write_json(BufWriter::new(file), &document, pretty)?;
        }
        None => write_json(std::io::stdout().lock(), &document, pretty)?,
    }
    info!(warnings = out.warnings.len(), "decoded {}", input.display());
    Ok(())
}

fn write_json(mut writer: impl Write, document: &Value, pretty: bool) -> anyhow::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut writer, document)?;
    } else {
        serde_json::to_writer(&mut writer, document)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn encode(registry: &Arc<RuleRegistry>, options: EngineOptions, input: &Path, output: &Path) -> anyhow::Result<()> {
    let file = File::open(input).with_context(|| format!("Failed to open '{}'", input.display()))?;
    let document: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("'{}' is not valid JSON", input.display()))?;

    let mut engine = new_engine(registry, options);
    engine.prepare(true)?;
    let out = engine
        .transform(Input::Document(document))
        .with_context(|| format!("Failed to encode '{}'", input.display()))?;
    enforce_counts(engine.options(), &out.warnings)?;
    engine.end()?;

    let bytes = out.output.into_bytes().context("encoding did not produce bytes")?;
    std::fs::write(output, &bytes).with_context(|| format!("Failed to write '{}'", output.display()))?;
    info!(bytes = bytes.len(), "encoded {}", output.display());
    Ok(())
}

fn list_rules(registry: &Arc<RuleRegistry>, options: EngineOptions) -> anyhow::Result<()> {
    let mut engine = new_engine(registry, options);
    engine.prepare(true)?;
    let mut stdout = std::io::stdout().lock();
    for name in registry.names() {
        let commands = registry.get(name)?;
        writeln!(stdout, "{:>6}  {}", command_count(&commands), name)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let CliArgs { command, config, strict } = CliArgs::parse();
    let options = resolve_options(config.as_deref(), strict)?;
    let registry = RuleRegistry::shared();

    match command {
        Commands::Decode { input, output, pretty } => decode(&registry, options, &input, output.as_deref(), pretty),
        Commands::Encode { input, output } => encode(&registry, options, &input, &output),
        Commands::Rules => list_rules(&registry, options),
    }
}
