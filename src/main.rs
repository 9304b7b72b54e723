use clap::{Args, Parser, Subcommand};
use log::{error, info};
use nid_parser::{
    models::{ExtractionRules, RecognizedFragment},
    processing::{shared_engine, FieldExtractor, OcrConfig},
    server::{self, AppState, DEFAULT_MAX_UPLOAD_BYTES},
    utils::NidError,
    NidParser, ParsedDocument,
};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "nid-parser")]
#[command(about = "Extract name, date of birth and ID number from national ID card photos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Extract fields from one image or a fragments JSON file
    Extract(ExtractArgs),
}

#[derive(Args)]
struct OcrArgs {
    /// Tesseract language code(s), e.g. "eng" or "eng+ben"
    #[arg(long, env = "NID_OCR_LANG", default_value = "eng")]
    lang: String,
    /// Directory containing Tesseract traineddata files
    #[arg(long, env = "NID_TESSDATA")]
    tessdata: Option<String>,
    /// JSON file overriding the default extraction rules
    #[arg(long, env = "NID_RULES")]
    rules: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "NID_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(short, long, env = "NID_PORT", default_value_t = 8000)]
    port: u16,
    /// Largest accepted upload in bytes
    #[arg(long, env = "NID_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
    #[command(flatten)]
    ocr: OcrArgs,
}

#[derive(Args)]
struct ExtractArgs {
    /// Card image to OCR
    #[arg(required_unless_present = "fragments", conflicts_with = "fragments")]
    image: Option<PathBuf>,
    /// Pre-recognized fragments as JSON instead of an image
    #[arg(long)]
    fragments: Option<PathBuf>,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    ocr: OcrArgs,
}

impl OcrArgs {
    fn load_rules(&self) -> Result<ExtractionRules, NidError> {
        match &self.rules {
            Some(path) => {
                info!("Loading extraction rules from {:?}", path);
                ExtractionRules::from_file(path)
            }
            None => Ok(ExtractionRules::default()),
        }
    }

    fn ocr_config(&self) -> OcrConfig {
        OcrConfig {
            language: self.lang.clone(),
            datapath: self.tessdata.clone(),
        }
    }

    fn build_parser(&self) -> Result<NidParser, NidError> {
        let extractor = FieldExtractor::new(&self.load_rules()?)?;
        let engine = shared_engine(&self.ocr_config())?;
        Ok(NidParser::new(engine, extractor))
    }
}

fn print_report(doc: &ParsedDocument) {
    let show = |field: &Option<String>| field.clone().unwrap_or_else(|| "Not detected".to_string());

    println!("\n===============================================");
    println!("          NATIONAL ID EXTRACTION REPORT");
    println!("===============================================\n");
    println!("  Name:          {}", show(&doc.result.name));
    println!("  Date of Birth: {}", show(&doc.result.dob));
    println!("  NID Number:    {}", show(&doc.result.nid));
    println!("\nFields found: {}/3", doc.result.found_count());
    if !doc.extracted_text.is_empty() {
        println!("\nEXTRACTED TEXT:\n  {}", doc.extracted_text);
    }
}

fn read_fragments(path: &Path) -> Result<Vec<RecognizedFragment>, NidError> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| NidError::ConfigError(format!("Invalid fragments file {:?}: {}", path, e)))
}

fn run_extract(args: ExtractArgs) -> Result<(), NidError> {
    let doc = match (&args.fragments, &args.image) {
        (Some(path), _) => {
            let extractor = FieldExtractor::new(&args.ocr.load_rules()?)?;
            ParsedDocument::from_fragments(&extractor, &read_fragments(path)?)
        }
        (None, Some(path)) => {
            info!("Reading card image {:?}", path);
            let image_data = fs::read(path)?;
            args.ocr.build_parser()?.parse_image(&image_data)?
        }
        (None, None) => {
            return Err(NidError::ConfigError(
                "an image path or --fragments is required".to_string(),
            ));
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| NidError::IoError(format!("Failed to serialize result: {}", e)))?;
        println!("{}", json);
    } else {
        print_report(&doc);
    }
    Ok(())
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, NidError> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| NidError::ConfigError(format!("Cannot resolve {}:{}", host, port)))
}

fn run_serve(args: ServeArgs) -> Result<(), NidError> {
    let addr = resolve_addr(&args.host, args.port)?;
    // Build the OCR engine up front so the first request does not pay for it
    let parser = args.ocr.build_parser()?;
    info!("OCR engine ready ({})", parser.engine_name());

    let state = AppState {
        parser: Arc::new(parser),
        max_upload_bytes: args.max_upload_bytes,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(addr, state))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Serve(args) => run_serve(args),
        Commands::Extract(args) => run_extract(args),
    };

    if let Err(err) = outcome {
        error!("{}", err);
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
