//! v2gexi CLI: XML/JSON <-> EXI fuer ISO 15118-20 Messages.

use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use v2gexi::{Error, Runtime, binary};

#[derive(Parser)]
#[command(name = "v2gexi", version, about = "Schema-informed EXI codec for ISO 15118-20 V2G messages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode XML or a JSON field tree to EXI
    Encode(EncodeArgs),
    /// Decode EXI to XML, or to a JSON field tree with --type
    Decode(DecodeArgs),
    /// Print the message name for a numeric type id
    Name {
        id: u32,
    },
}

#[derive(Args)]
struct SchemaArgs {
    /// XSD file or directory (repeatable)
    #[arg(short, long = "schema", required = true)]
    schemas: Vec<PathBuf>,

    /// Option as name=value (strictFieldMode, maxStringTableEntries, builtInGrammarPolicy)
    #[arg(long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,
}

#[derive(Args)]
struct EncodeArgs {
    #[command(flatten)]
    schema: SchemaArgs,

    /// XML input file (- for stdin)
    #[arg(long, conflicts_with_all = ["json", "message_type"])]
    xml: Option<String>,

    /// Message type as name or numeric id
    #[arg(long = "type", requires = "json")]
    message_type: Option<String>,

    /// JSON field tree (- for stdin)
    #[arg(long, requires = "message_type")]
    json: Option<String>,

    /// Write hex text instead of raw bytes
    #[arg(long)]
    hex: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args)]
struct DecodeArgs {
    #[command(flatten)]
    schema: SchemaArgs,

    /// Decode into a JSON field tree for this message type (name or id)
    #[arg(long = "type")]
    message_type: Option<String>,

    /// Input is hex text
    #[arg(long)]
    hex: bool,

    /// EXI input file (- for stdin)
    input: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<String>,
}

enum CliError {
    Codec(Error),
    Usage(String),
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        Self::Codec(e)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e {
            CliError::Codec(e) => {
                eprintln!("Fehler ({}): {e}", e.kind());
                process::exit(e.kind().status());
            }
            CliError::Usage(msg) => {
                eprintln!("Fehler: {msg}");
                process::exit(1);
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Encode(args) => run_encode(args),
        Command::Decode(args) => run_decode(args),
        Command::Name { id } => {
            println!("{}", Runtime::new().message_type_name(id));
            Ok(())
        }
    }
}

fn runtime(args: &SchemaArgs) -> Result<Runtime, CliError> {
    let rt = Runtime::new();
    rt.init()?;
    for option in &args.options {
        let (name, value) = option
            .split_once('=')
            .ok_or_else(|| CliError::Usage(format!("option '{option}' is not NAME=VALUE")))?;
        rt.set_option(name.trim(), value)?;
    }
    rt.load_schemas(&args.schemas)?;
    Ok(rt)
}

fn type_id(rt: &Runtime, name: &str) -> Result<u32, CliError> {
    if let Ok(id) = name.parse() {
        return Ok(id);
    }
    rt.catalog()
        .id_for_name(name)
        .ok_or_else(|| CliError::Usage(format!("unknown message type '{name}'")))
}

fn run_encode(args: EncodeArgs) -> Result<(), CliError> {
    let rt = runtime(&args.schema)?;
    let handle = match (&args.xml, &args.message_type, &args.json) {
        (Some(path), _, _) => rt.encode_xml(&read_input(path)?)?,
        (None, Some(name), Some(path)) => {
            let id = type_id(&rt, name)?;
            let tree: serde_json::Value = serde_json::from_slice(&read_input(path)?)
                .map_err(|e| CliError::Usage(format!("invalid JSON: {e}")))?;
            rt.encode_struct(id, &tree)?
        }
        _ => return Err(CliError::Usage("either --xml or --type with --json is required".into())),
    };
    let bytes = rt.buffer(handle)?;
    rt.release(handle)?;

    if args.hex {
        let mut text = binary::to_hex(&bytes);
        text.push('\n');
        write_output(args.output.as_deref(), text.as_bytes())
    } else {
        write_output(args.output.as_deref(), &bytes)
    }
}

fn run_decode(args: DecodeArgs) -> Result<(), CliError> {
    let rt = runtime(&args.schema)?;
    let raw = read_input(&args.input)?;
    let exi = if args.hex {
        let text = String::from_utf8_lossy(&raw);
        let compact: String = text.split_whitespace().collect();
        binary::parse_hex(&compact).ok_or_else(|| CliError::Usage("input is not valid hex".into()))?
    } else {
        raw
    };

    match &args.message_type {
        Some(name) => {
            let id = type_id(&rt, name)?;
            let tree = rt.decode_struct(id, &exi)?;
            let mut text = serde_json::to_string_pretty(&tree)
                .map_err(|e| CliError::Usage(format!("JSON output failed: {e}")))?;
            text.push('\n');
            write_output(args.output.as_deref(), text.as_bytes())
        }
        None => {
            let handle = rt.decode_exi(&exi)?;
            let xml = rt.buffer(handle)?;
            rt.release(handle)?;
            let mut text = xml.to_vec();
            text.push(b'\n');
            write_output(args.output.as_deref(), &text)
        }
    }
}

fn read_input(path: &str) -> Result<Vec<u8>, CliError> {
    if path == "-" {
        if std::io::stdin().is_terminal() {
            eprintln!("Lese von stdin (Ctrl+D zum Beenden)...");
        }
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| CliError::Usage(format!("Lesefehler (stdin): {e}")))?;
        Ok(buf)
    } else {
        std::fs::read(path).map_err(|e| CliError::Usage(format!("Lesefehler '{path}': {e}")))
    }
}

fn write_output(path: Option<&str>, bytes: &[u8]) -> Result<(), CliError> {
    match path {
        None | Some("-") => {
            let mut out = std::io::stdout().lock();
            out.write_all(bytes)
                .and_then(|()| out.flush())
                .map_err(|e| CliError::Usage(format!("Schreibfehler (stdout): {e}")))
        }
        Some(path) => std::fs::write(path, bytes)
            .map_err(|e| CliError::Usage(format!("Schreibfehler '{path}': {e}"))),
    }
}
