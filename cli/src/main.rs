use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use cli::{
    handlers::{
        handle_inspect, handle_merge_lora, handle_quantize, quantization_spec,
    },
    logger,
};
use console::style;
use kura::quantization::QuantizationMode;

#[derive(Parser)]
#[command(name = "kura_cli")]
#[command(version = kura::VERSION)]
#[command(about = "Tensor archive tooling for diffusion model weights", long_about = None)]
struct Cli {
    /// Log progress and skipped tensors to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tensors and metadata of a safetensors archive
    Inspect {
        /// Path to the archive
        archive: PathBuf,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Quantize every archive of a model directory
    Quantize {
        /// Directory holding the full precision model
        input_dir: PathBuf,
        /// Directory to write the quantized model to
        output_dir: PathBuf,
        /// Defaults to 32
        #[arg(long)]
        group_size: Option<usize>,
        /// Defaults to 8 for affine and 4 for mxfp4
        #[arg(long)]
        bits: Option<usize>,
        /// affine or mxfp4
        #[arg(long, default_value_t = QuantizationMode::Affine)]
        mode: QuantizationMode,
        /// Model id recorded in the manifest
        #[arg(long)]
        model_id: Option<String>,
        /// Revision recorded in the manifest
        #[arg(long)]
        revision: Option<String>,
    },
    /// Merge a LoRA adapter into a model's archives
    MergeLora {
        /// Directory holding the model archives
        model_dir: PathBuf,
        /// LoRA archive, directory or model id
        lora: String,
        /// Directory to write the merged archives to
        output: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        strength: f32,
    },
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let result = match cli.command {
        Some(Commands::Inspect {
            archive,
            json,
        }) => handle_inspect(&archive, json),
        Some(Commands::Quantize {
            input_dir,
            output_dir,
            group_size,
            bits,
            mode,
            model_id,
            revision,
        }) => handle_quantize(
            &input_dir,
            &output_dir,
            quantization_spec(mode, group_size, bits),
            model_id,
            revision,
        ),
        Some(Commands::MergeLora {
            model_dir,
            lora,
            output,
            strength,
        }) => handle_merge_lora(&model_dir, &lora, &output, strength),
        None => {
            let _ = Cli::command().print_help();
            Ok(())
        },
    };

    if let Err(error) = result {
        eprintln!("{} {error:#}", style("error:").red().bold());
        std::process::exit(1);
    }
}
