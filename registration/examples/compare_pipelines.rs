//Register a moving image against a fixed one with all four pipelines
//(GA and PSO, each with MSE and MI), print the summary and write the
//registered images plus a side-by-side montage

use std::path::Path;

use clap::Parser;
use image_transform::image_transformation::{load_rgb_image, save_image};
use image_transform::montage::comparison_montage;
use registration::pipeline::{format_summary, registered_image, run_all, PipelineConfig};
use registration::utils::set_log_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    //path to the reference image
    #[arg(short, long, default_value = "images/fixed.png")]
    fixed: String,
    //path to the image to be registered
    #[arg(short, long, default_value = "images/moving.png")]
    moving: String,
    #[arg(short, long, default_value = ".")]
    output_dir: String,
    //base seed; pipeline i runs with seed + i
    #[arg(short, long)]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();
    let log = set_log_config();

    let fixed = load_rgb_image(&args.fixed).expect("could not load fixed image");
    let moving = load_rgb_image(&args.moving).expect("could not load moving image");

    let config = PipelineConfig {
        seed: args.seed,
        ..PipelineConfig::default()
    };
    let results = run_all(&fixed, &moving, &config, &log);
    print!("{}", format_summary(&results));

    let output_dir = Path::new(&args.output_dir);
    let mut registered = Vec::with_capacity(results.len());
    for (kind, result) in &results {
        let image = result
            .as_ref()
            .ok()
            .map(|r| registered_image(&moving, r).expect("could not warp moving image"));
        if let Some(image) = &image {
            let path = output_dir.join(kind.output_file_name());
            save_image(image, path.to_str().expect("non UTF-8 output path"))
                .expect("could not save registered image");
            println!("Saved {}", path.display());
        }
        registered.push(image);
    }

    let mut panels = vec![Some(&fixed), Some(&moving)];
    panels.extend(registered.iter().map(|image| image.as_ref()));
    let montage = comparison_montage(&panels, 3);
    let montage_path = output_dir.join("registration_comparison.png");
    save_image(
        &montage,
        montage_path.to_str().expect("non UTF-8 output path"),
    )
    .expect("could not save montage");
    println!("Saved {}", montage_path.display());
}
