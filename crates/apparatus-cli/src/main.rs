use std::env;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use apparatus_config::Config;
use apparatus_engine::{ApparatusEditor, EditorOptions};

struct Args {
    document: PathBuf,
    export: Option<PathBuf>,
    title: String,
}

fn parse_args() -> Option<Args> {
    let mut args = env::args().skip(1);
    let document = PathBuf::from(args.next()?);
    let mut export = None;
    let mut title = "Apparatus".to_string();

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--export" => export = Some(PathBuf::from(args.next()?)),
            "--title" => title = args.next()?,
            _ => return None,
        }
    }
    Some(Args {
        document,
        export,
        title,
    })
}

fn editor_options(config: &Config) -> EditorOptions {
    EditorOptions {
        history_capacity: config.history_capacity,
        history_debounce: Duration::from_millis(config.history_debounce_ms),
        update_warmup: Duration::from_millis(config.update_warmup_ms),
        default_comment_color: config.default_comment_color.clone(),
    }
}

fn run(args: Args, config: Config) -> Result<()> {
    let json = std::fs::read_to_string(&args.document)
        .with_context(|| format!("reading document '{}'", args.document.display()))?;
    let editor = ApparatusEditor::from_json(Some(&json), editor_options(&config), Instant::now())
        .with_context(|| format!("parsing document '{}'", args.document.display()))?;

    let ids = editor.get_apparatuses_ids();
    println!("{} apparatus entries", ids.len());
    for id in &ids {
        let nodes = editor.get_apparatus_nodes(*id).unwrap_or_default();
        let lemma = nodes.iter().find_map(|n| match n {
            apparatus_engine::Node::Lemma { attrs } => Some(attrs.display()),
            _ => None,
        });
        match lemma {
            Some(display) => println!("  {id}  {display}"),
            None => println!("  {id}  (no lemma)"),
        }
    }

    if let Some(export_path) = args.export {
        let export = editor.get_export_data(&args.title, true, &config.reading_column_template);

        let mut writer = csv::Writer::from_path(&export_path)
            .with_context(|| format!("creating '{}'", export_path.display()))?;
        let mut headers = vec![args.title.clone()];
        headers.extend(export.additional_headers.iter().cloned());
        writer.write_record(&headers)?;
        for row in &export.data {
            let record: Vec<&str> = headers
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or(""))
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        println!("exported {} rows to {}", export.data.len(), export_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let Some(args) = parse_args() else {
        eprintln!("Usage: apparatus-cli <document.json> [--export <out.csv>] [--title <name>]");
        process::exit(1);
    };

    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => Config::default(),
        Err(e) => {
            eprintln!("Error: failed to load config file: {e}");
            process::exit(1);
        }
    };

    run(args, config)
}
