use antakshari::config::Config;
use antakshari::dictionary::{Dictionary, PlaceKind, fetch_places, parse_places};
use antakshari::validator::{Validation, WordValidator};
use clap::{App, Arg, ArgMatches, SubCommand};
use std::collections::HashSet;
use std::sync::Arc;

fn kind_arg() -> Arg<'static> {
    Arg::with_name("kind")
        .long("kind")
        .help("country or city; picks the default rare threshold")
        .takes_value(true)
        .default_value("city")
}

fn rare_over_arg() -> Arg<'static> {
    Arg::with_name("rare-over")
        .long("rare-over")
        .help("names longer than this are flagged rare")
        .takes_value(true)
}

fn rare_threshold(args: &ArgMatches) -> Result<usize, String> {
    let kind = PlaceKind::from_str(args.value_of("kind").unwrap_or("city"));
    match args.value_of("rare-over") {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("--rare-over must be a number, got {}", raw)),
        None => Ok(kind.default_rare_over()),
    }
}

fn save(dictionary: &Dictionary, path: &str) {
    if let Err(e) = dictionary.save_to_file(path) {
        eprintln!("failed to save dictionary: {}", e);
    } else {
        println!("saved {}", path);
    }
}

#[tokio::main]
async fn main() {
    let matches = App::new("dict-tool")
        .version("1.0")
        .about("Maintain the Antakshari place-name dictionary")
        .subcommand(SubCommand::with_name("stats").about("Show dictionary counts"))
        .subcommand(
            SubCommand::with_name("check")
                .about("Check whether a word would be accepted as an opener")
                .arg(Arg::with_name("word").help("word to check").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("Add a word")
                .arg(Arg::with_name("word").help("word to add").required(true).index(1))
                .arg(Arg::with_name("rare").long("rare").help("flag the word as rare")),
        )
        .subcommand(
            SubCommand::with_name("remove")
                .about("Remove a word and its aliases")
                .arg(Arg::with_name("word").help("word to remove").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("alias")
                .about("Make two spellings interchangeable")
                .arg(Arg::with_name("a").help("first spelling").required(true).index(1))
                .arg(Arg::with_name("b").help("second spelling").required(true).index(2)),
        )
        .subcommand(SubCommand::with_name("validate").about("Check dictionary integrity"))
        .subcommand(
            SubCommand::with_name("import")
                .about("Import a [{\"name\": ...}] place list from a file")
                .arg(Arg::with_name("file").help("input file").required(true).index(1))
                .arg(kind_arg())
                .arg(rare_over_arg()),
        )
        .subcommand(
            SubCommand::with_name("fetch")
                .about("Download and import a [{\"name\": ...}] place list")
                .arg(Arg::with_name("url").help("http(s) url").required(true).index(1))
                .arg(kind_arg())
                .arg(rare_over_arg()),
        )
        .subcommand(
            SubCommand::with_name("export")
                .about("Write the dictionary to a file")
                .arg(Arg::with_name("file").help("output file").required(true).index(1)),
        )
        .get_matches();

    if let Err(e) = Config::init() {
        eprintln!("failed to load configuration: {}", e);
        return;
    }
    let path = Config::get().dictionary.file_path.clone();
    let mut dictionary = Dictionary::load_or_fallback(&Config::get().dictionary);

    match matches.subcommand() {
        Some(("stats", _)) => {
            let stats = dictionary.stats();
            println!("dictionary {}:", path);
            println!("  valid words: {}", stats.total_words);
            println!("  rare words: {}", stats.rare_words);
            println!("  alias pairs: {}", stats.alias_pairs);
        }
        Some(("check", args)) => {
            let word = args.value_of("word").unwrap_or_default();
            let validator = WordValidator::new(Arc::new(dictionary));
            match validator.validate(word, None, &HashSet::new()) {
                Validation::Valid(valid) => {
                    print!("'{}' is valid", valid.word);
                    if let Some(alias) = &valid.alias {
                        print!(" (alias of '{}')", alias);
                    }
                    if valid.rare {
                        print!(" [rare]");
                    }
                    println!();
                }
                Validation::Invalid(reason) => println!("'{}' is rejected: {}", word, reason),
            }
        }
        Some(("add", args)) => {
            let word = args.value_of("word").unwrap_or_default();
            dictionary.add_word(word, args.is_present("rare"));
            save(&dictionary, &path);
        }
        Some(("remove", args)) => {
            let word = args.value_of("word").unwrap_or_default();
            if dictionary.remove_word(word) {
                save(&dictionary, &path);
            } else {
                println!("'{}' is not in the dictionary", word);
            }
        }
        Some(("alias", args)) => {
            let a = args.value_of("a").unwrap_or_default();
            let b = args.value_of("b").unwrap_or_default();
            dictionary.add_alias(a, b);
            save(&dictionary, &path);
        }
        Some(("validate", _)) => {
            let errors = dictionary.validate();
            if errors.is_empty() {
                println!("dictionary is consistent");
            } else {
                println!("found {} problems:", errors.len());
                for error in errors {
                    println!("  - {}", error);
                }
            }
        }
        Some(("import", args)) => {
            let rare_over = match rare_threshold(args) {
                Ok(n) => n,
                Err(e) => return eprintln!("{}", e),
            };
            let file = args.value_of("file").unwrap_or_default();
            let names = match std::fs::read_to_string(file)
                .map_err(|e| e.to_string())
                .and_then(|json| parse_places(&json).map_err(|e| e.to_string()))
            {
                Ok(names) => names,
                Err(e) => return eprintln!("failed to read {}: {}", file, e),
            };
            let added = dictionary.import_names(names, rare_over);
            println!("imported {} new words", added);
            save(&dictionary, &path);
        }
        Some(("fetch", args)) => {
            let rare_over = match rare_threshold(args) {
                Ok(n) => n,
                Err(e) => return eprintln!("{}", e),
            };
            let url = args.value_of("url").unwrap_or_default();
            match fetch_places(url).await {
                Ok(names) => {
                    let added = dictionary.import_names(names, rare_over);
                    println!("imported {} new words from {}", added, url);
                    save(&dictionary, &path);
                }
                Err(e) => eprintln!("fetch failed: {}", e),
            }
        }
        Some(("export", args)) => {
            let file = args.value_of("file").unwrap_or_default();
            save(&dictionary, file);
        }
        _ => {
            println!("run with --help to list commands");
        }
    }
}
