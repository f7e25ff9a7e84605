use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pokecollection::{
  build_api_client, build_deck_view, collection_stats, create_deck, delete_deck, display_type,
  export_collection_csv, filter_cards, find_card, find_deck, image_path, init_database, list_decks,
  load_collection_rows, open_database, parse_deck_lines, sync_sets, update_quantity, CardFilter,
  DeckLine, DEFAULT_DB_FILE, DEFAULT_EXPORT_FILE, DEFAULT_IMAGE_DIR, DEFAULT_SYNC_SETS,
};

#[derive(Parser, Debug)]
#[command(name = "pokecollection")]
#[command(about = "Pokemon TCG collection and deck tracker")]
struct Cli {
  /// Database file
  #[arg(long, default_value = DEFAULT_DB_FILE)]
  db: PathBuf,

  /// Directory holding cached card images
  #[arg(long, default_value = DEFAULT_IMAGE_DIR)]
  images: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Fetch card catalogs from the pokemontcg.io API
  Sync {
    /// Set identifiers to fetch (defaults to the Scarlet & Violet sets)
    sets: Vec<String>,

    /// API key (falls back to POKEMONTCG_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
  },
  /// List collection cards, optionally filtered
  List {
    /// Name substring, case-insensitive
    #[arg(long, default_value = "")]
    name: String,

    /// Exact set name ("Todos" lists every set)
    #[arg(long, default_value = "Todos")]
    set: String,

    /// Minimum owned quantity
    #[arg(long, default_value_t = 0)]
    min_quantity: i64,

    /// Rarity filter label
    #[arg(long, default_value = "Todos")]
    rarity: String,

    /// Type filter label
    #[arg(long, default_value = "Todos")]
    card_type: String,
  },
  /// Show one card's stored details
  Show { card_id: String },
  /// Set the owned quantity of a card
  SetQuantity {
    card_id: String,
    #[arg(allow_negative_numbers = true)]
    quantity: i64,
  },
  /// Export owned cards to a CSV file
  Export {
    /// Output file
    #[arg(long, default_value = DEFAULT_EXPORT_FILE)]
    output: PathBuf,
  },
  /// Print collection totals
  Stats,
  /// Manage saved deck lists
  #[command(subcommand)]
  Deck(DeckCommands),
}

#[derive(Subcommand, Debug)]
enum DeckCommands {
  /// Save a deck list
  Add {
    /// Deck name
    #[arg(long)]
    name: String,

    /// Read the deck list from a file instead of stdin
    #[arg(long)]
    file: Option<PathBuf>,
  },
  /// List saved decks
  List,
  /// Show a deck's cards and summary
  Show { deck_id: String },
  /// Delete a deck
  Delete { deck_id: String },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let Cli { db, images, command } = Cli::parse();
  init_database(&db)?;

  match command {
    Commands::Sync { sets, api_key } => run_sync(&db, &images, sets, api_key),
    Commands::List {
      name,
      set,
      min_quantity,
      rarity,
      card_type,
    } => run_list(&db, &name, &set, min_quantity, &rarity, &card_type),
    Commands::Show { card_id } => run_show(&db, &images, &card_id),
    Commands::SetQuantity { card_id, quantity } => run_set_quantity(&db, &card_id, quantity),
    Commands::Export { output } => run_export(&db, &output),
    Commands::Stats => run_stats(&db),
    Commands::Deck(deck_command) => match deck_command {
      DeckCommands::Add { name, file } => run_deck_add(&db, &name, file),
      DeckCommands::List => run_deck_list(&db),
      DeckCommands::Show { deck_id } => run_deck_show(&db, &images, &deck_id),
      DeckCommands::Delete { deck_id } => run_deck_delete(&db, &deck_id),
    },
  }
}

fn run_sync(db: &Path, images: &Path, sets: Vec<String>, api_key: Option<String>) -> Result<()> {
  let Some(api_key) = api_key.or_else(|| env::var("POKEMONTCG_API_KEY").ok()) else {
    bail!("an API key is required: pass --api-key or set POKEMONTCG_API_KEY");
  };

  let sets = if sets.is_empty() {
    DEFAULT_SYNC_SETS.iter().map(|set| set.to_string()).collect()
  } else {
    sets
  };

  let mut connection = open_database(db)?;
  let client = build_api_client()?;
  let report = sync_sets(&mut connection, &client, &api_key, &sets, images)?;

  println!(
    "Synced {}/{} sets: {} cards seen, {} inserted, {} images downloaded, {} skipped, {} failed",
    report.sets_completed,
    report.sets_requested,
    report.cards_seen,
    report.cards_inserted,
    report.images_downloaded,
    report.images_skipped,
    report.images_failed
  );
  Ok(())
}

fn run_list(db: &Path, name: &str, set: &str, min_quantity: i64, rarity: &str, card_type: &str) -> Result<()> {
  let connection = open_database(db)?;
  let cards = load_collection_rows(&connection)?;
  let filter = CardFilter::from_labels(name, set, min_quantity, rarity, card_type)?;
  let filtered = filter_cards(&cards, &filter);

  for card in &filtered {
    println!("{} - {} x{}", card.card_id, card.name, card.quantity);
  }
  println!("{} of {} cards", filtered.len(), cards.len());
  Ok(())
}

fn run_show(db: &Path, images: &Path, card_id: &str) -> Result<()> {
  let connection = open_database(db)?;
  let Some(card) = find_card(&connection, card_id)? else {
    bail!("card not found in collection: {}", card_id);
  };

  println!("ID: {}", card.card_id);
  println!("Nombre: {}", card.name);
  println!("Conjunto: {}", card.set_name);
  println!("Cantidad: {}", card.quantity);
  println!(
    "Rareza: {}",
    if card.rarity.is_empty() { "N/A" } else { card.rarity.as_str() }
  );
  println!("Tipo: {}", display_type(&card));
  println!("Supertipo: {}", card.supertype.as_deref().unwrap_or("N/A"));

  let path = image_path(images, &card.card_id);
  if path.exists() {
    println!("Imagen: {}", path.display());
  } else {
    println!("Imagen no encontrada");
  }
  Ok(())
}

fn run_set_quantity(db: &Path, card_id: &str, quantity: i64) -> Result<()> {
  let connection = open_database(db)?;
  let update = update_quantity(&connection, card_id, quantity)?;
  if update.changed {
    println!("Quantity of {} updated to {}", update.card_id, update.quantity);
  } else {
    println!("Quantity of {} is already {}", update.card_id, update.quantity);
  }
  Ok(())
}

fn run_export(db: &Path, output: &Path) -> Result<()> {
  let connection = open_database(db)?;
  let exported = export_collection_csv(&connection, output)?;
  println!("Exported {} cards to {}", exported, output.display());
  Ok(())
}

fn run_stats(db: &Path) -> Result<()> {
  let connection = open_database(db)?;
  let stats = collection_stats(&connection)?;
  println!("Cards in catalog: {}", stats.total_cards);
  println!("Cards owned: {}", stats.owned_cards);
  println!("Total copies: {}", stats.total_quantity);
  println!("Decks saved: {}", stats.deck_count);
  Ok(())
}

fn run_deck_add(db: &Path, name: &str, file: Option<PathBuf>) -> Result<()> {
  let text = match file {
    Some(path) => fs::read_to_string(path)?,
    None => {
      let mut buffer = String::new();
      std::io::stdin().read_to_string(&mut buffer)?;
      buffer
    }
  };

  let connection = open_database(db)?;
  let deck = create_deck(&connection, name, &text)?;

  let lines = parse_deck_lines(&deck.deck_text);
  let matched = lines.iter().filter(|line| matches!(line, DeckLine::Matched(_))).count();
  let skipped = lines
    .iter()
    .filter(|line| matches!(line, DeckLine::Skipped(text) if !text.trim().is_empty()))
    .count();

  println!(
    "Saved deck '{}' ({}): {} lines matched, {} skipped",
    deck.deck_name, deck.deck_id, matched, skipped
  );
  Ok(())
}

fn run_deck_list(db: &Path) -> Result<()> {
  let connection = open_database(db)?;
  for deck in list_decks(&connection)? {
    println!("{}: {}", deck.deck_id, deck.deck_name);
  }
  Ok(())
}

fn run_deck_show(db: &Path, images: &Path, deck_id: &str) -> Result<()> {
  let connection = open_database(db)?;
  let Some(deck) = find_deck(&connection, deck_id)? else {
    bail!("deck not found: {}", deck_id);
  };

  let view = build_deck_view(&connection, images, &deck.deck_text)?;

  println!("{}: {}", deck.deck_id, deck.deck_name);
  for card in &view.cards {
    println!("{} - Cant: {}", card.name, card.quantity);
  }
  println!("Pokémon: {}", view.summary.pokemon_count);
  println!("Entrenador: {}", view.summary.trainer_count);
  println!("Energías: {}", view.summary.energy_count);
  if view.summary.energy_types.is_empty() {
    println!("  Ninguna");
  } else {
    for energy in &view.summary.energy_types {
      println!("  {}: {}", energy.name, energy.quantity);
    }
  }
  Ok(())
}

fn run_deck_delete(db: &Path, deck_id: &str) -> Result<()> {
  let connection = open_database(db)?;
  if delete_deck(&connection, deck_id)? {
    println!("Deleted deck {}", deck_id);
  } else {
    bail!("deck not found: {}", deck_id);
  }
  Ok(())
}
