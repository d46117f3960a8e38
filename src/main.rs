use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Arg, ArgAction, Command};

use audiobook_pages::pool::progress_bar;
use audiobook_pages::{
    improve_pages, load_document, narrate_pages, AudioFormat, Book, Config, OpenAiClient,
    PagePipeline, PageRange, SpeechEngine,
};

fn cli() -> Command {
    Command::new("Audiobook Generator")
        .version("1.0")
        .about("Splits long text into narrated audiobook pages")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Input document (.txt, .md, .html or .epub)")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON settings file"),
        )
        .arg(
            Arg::new("pages")
                .short('p')
                .long("pages")
                .value_name("START:END")
                .help("Only paginate raw pages START (inclusive) to END (exclusive)")
                .value_parser(clap::value_parser!(PageRange)),
        )
        .arg(
            Arg::new("title")
                .short('t')
                .long("title")
                .value_name("NAME")
                .help("Book title, defaults to the input file name"),
        )
        .arg(
            Arg::new("target-words")
                .long("target-words")
                .value_name("NUM")
                .help("Word count raw pages are packed towards")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("NUM")
                .help("Concurrent language model requests")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Output audio format")
                .value_parser(["wav", "mp3", "vorbis"]),
        )
        .arg(
            Arg::new("improve")
                .long("improve")
                .help("Rewrite each page into a clean narration transcript")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-audio")
                .long("no-audio")
                .help("Skip speech synthesis")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let input_path = PathBuf::from(matches.get_one::<String>("input").ok_or("missing --input")?);
    let output_dir = PathBuf::from(matches.get_one::<String>("output").ok_or("missing --output")?);
    let range = matches.get_one::<PageRange>("pages").copied();

    let mut config = Config::load(matches.get_one::<String>("config").map(Path::new))?;
    if let Some(target) = matches.get_one::<usize>("target-words") {
        config.paging.target_words = *target;
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.paging.workers = *workers;
    }
    if let Some(format) = matches.get_one::<String>("format") {
        config.narration.output_format = format.parse::<AudioFormat>()?;
    }
    if config.narration.assets_dir.is_relative() {
        config.narration.assets_dir = output_dir.join(&config.narration.assets_dir);
    }
    config.paging.validate()?;

    let title = matches
        .get_one::<String>("title")
        .cloned()
        .or_else(|| input_path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "AudioBook".to_string());

    println!("🔄 Initializing audiobook generator...");
    let start_time = Instant::now();

    let llm = Arc::new(OpenAiClient::new(
        &config.llm,
        config.paging.request_timeout(),
    )?);

    println!("📖 Loading {}...", input_path.display());
    let document = load_document(&input_path)?;

    println!("✂️  Splitting into pages...");
    let pipeline = PagePipeline::new(config.paging.clone(), llm.clone())
        .with_progress(progress_bar(0, "Smart splitting"));
    let chunks = pipeline.run(&document, range).await;
    let mut book = Book::from_chunks(title, chunks);
    println!("✅ Found {} pages", book.pages.len());
    println!("📊 Total words: {}", book.total_words());

    if matches.get_flag("improve") {
        println!("🪄 Improving transcripts...");
        book.pages = improve_pages(
            book.pages,
            llm.clone(),
            config.paging.workers,
            config.paging.max_attempts,
            &progress_bar(0, "Improving transcript"),
        )
        .await;
    }

    if !matches.get_flag("no-audio") && !book.pages.is_empty() {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.narration.workers.max(1))
            .build_global()?;

        println!("🎤 Converting pages to audio...");
        let engine = SpeechEngine::new(config.narration.clone())?;
        narrate_pages(&mut book.pages, &engine)?;
    }

    println!("📝 Writing manifest and playlist...");
    let audio_dir = config
        .narration
        .assets_dir
        .strip_prefix(&output_dir)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| config.narration.assets_dir.clone());
    let manifest = book.write_to(&output_dir, &audio_dir)?;

    let duration = start_time.elapsed();
    println!("✅ Conversion completed in {:.2?}", duration);
    println!("📁 Output saved to: {}", manifest.display());

    Ok(())
}
