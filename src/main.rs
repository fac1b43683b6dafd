use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use unpbo::{
    extract_with_options, parse_file, DuplicatePolicy, ExtractOptions, SizePolicy,
};

#[derive(Parser)]
#[command(name = "unpbo", about = "Mission-asset bank reader and extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List archive entries
    List {
        input: PathBuf,
        /// Print the entry table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
    },
    /// Extract stored entries
    Extract {
        input: PathBuf,
        /// Output directory (default: archive name without extension, next to it)
        #[arg(short = 'C', long)]
        output_dir: Option<PathBuf>,
        /// Fail when a stored entry's original size differs from its data size
        #[arg(long)]
        strict_sizes: bool,
        /// Fail instead of overwriting when two entries share a path
        #[arg(long)]
        reject_duplicates: bool,
        /// Print progress percentage after every entry
        #[arg(long)]
        progress: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let table = parse_file(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
                return Ok(());
            }
            println!("Archive: {}", input.display());
            println!("{:<40} {:>12} {:>12} {:>12} {:>10}",
                     "Name", "Packing", "Original", "Size", "Timestamp");
            for e in table.entries() {
                println!("{:<40} {:>12} {:>12} {:>12} {:>10}",
                    e.name, e.packing().name(), e.original_size, e.data_size, e.timestamp);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let table  = parse_file(&input)?;
            let packed = table.packed_entries().count();

            println!("── Archive ──────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Entries        {}", table.len());
            println!("  Stored         {}", table.len() - packed);
            println!("  Packed         {}", packed);
            println!("  Payload size   {} B", table.total_bytes());
            println!("  Properties     {} B", table.properties().len());
            println!("  Data offset    {} B", table.data_offset());
            if packed > 0 {
                println!("  Note           packed entries need an external extractor");
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir, strict_sizes, reject_duplicates, progress } => {
            let output_dir = output_dir.unwrap_or_else(|| default_output_dir(&input));
            let opts = ExtractOptions {
                size_policy: if strict_sizes {
                    SizePolicy::RequireEqual
                } else {
                    SizePolicy::IgnoreOriginal
                },
                duplicate_policy: if reject_duplicates {
                    DuplicatePolicy::Reject
                } else {
                    DuplicatePolicy::Overwrite
                },
                ..ExtractOptions::default()
            };

            let result = extract_with_options(
                &input,
                &output_dir,
                opts,
                |line| println!("{line}"),
                |fraction| if progress { println!("[{:>5.1}%]", fraction * 100.0) },
            );
            if let Err(ref err) = result {
                if err.is_unsupported_encoding() {
                    eprintln!("hint: this archive contains packed entries; use an external extractor");
                }
            }
            result?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_os_string()).unwrap_or_else(|| "extracted".into());
    input.parent().unwrap_or_else(|| Path::new(".")).join(stem)
}
