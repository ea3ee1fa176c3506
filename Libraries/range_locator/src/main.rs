use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::Read;
use std::process;

use range_locator::fetcher::DEFAULT_FETCH_TIMEOUT;
use range_locator::{Container, HttpFetcher, RangeLocator, SegmentRanges, PREFIX_SIZE};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install the log subscriber: {}", e);
    }

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <file_or_url> [webm|mp4]", args[0]);
        process::exit(1);
    }

    let source = &args[1];
    let container = match args.get(2).map(String::as_str) {
        Some("webm") => Container::Webm,
        Some("mp4") => Container::Mp4,
        Some(other) => {
            eprintln!("Unknown container '{}', expected webm or mp4", other);
            process::exit(1);
        }
        None if source.ends_with(".webm") => Container::Webm,
        None => Container::Mp4,
    };

    let ranges = if source.starts_with("http://") || source.starts_with("https://") {
        run_url_mode(source, container).await
    } else {
        run_file_mode(source, container)
    };

    println!("container:      {:?}", container);
    println!("initialization: {}", ranges.init);
    println!("index:          {}", ranges.index);
    if !ranges.is_found() {
        println!("No index found in the first {} bytes", PREFIX_SIZE);
    }
}

async fn run_url_mode(url: &str, container: Container) -> SegmentRanges {
    let fetcher = match HttpFetcher::new(DEFAULT_FETCH_TIMEOUT) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    match RangeLocator::new(fetcher)
        .locate(url, container, &HashMap::new())
        .await
    {
        Ok(ranges) => ranges,
        Err(e) => {
            eprintln!("Failed to fetch '{}': {}", url, e);
            process::exit(1);
        }
    }
}

fn run_file_mode(filename: &str, container: Container) -> SegmentRanges {
    let mut prefix = Vec::with_capacity(PREFIX_SIZE);
    let read = File::open(filename)
        .and_then(|file| file.take(PREFIX_SIZE as u64).read_to_end(&mut prefix));
    if let Err(e) = read {
        eprintln!("Failed to read file '{}': {}", filename, e);
        process::exit(1);
    }

    container.find_ranges(&prefix)
}
