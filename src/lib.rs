use anyhow::{bail, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const MIGRATION_SQL_0001: &str = include_str!("../migrations/0001_initial.sql");
const MIGRATION_SQL_0002: &str = include_str!("../migrations/0002_decks.sql");
const API_CARDS_URL: &str = "https://api.pokemontcg.io/v2/cards";
const API_PAGE_SIZE: usize = 250;
const API_PAGE_DELAY_MS: u64 = 250;
const API_TIMEOUT_SECONDS: u64 = 60;
const CSV_HEADER: [&str; 6] = ["ID", "Nombre", "Conjunto", "Cantidad", "Rareza", "Tipo"];

pub const DEFAULT_DB_FILE: &str = "pokemon_collection.db";
pub const DEFAULT_IMAGE_DIR: &str = "card_images";
pub const DEFAULT_EXPORT_FILE: &str = "coleccion.csv";
pub const DEFAULT_SYNC_SETS: [&str; 10] = [
  "sv1", "sv2", "sv3", "sv3pt5", "sv4", "sv4pt5", "sv5", "sv6", "sv6pt5", "sv7",
];

pub struct LabelMap {
  entries: Vec<(&'static str, Option<&'static str>)>,
}

impl LabelMap {
  fn new(entries: &[(&'static str, Option<&'static str>)]) -> LabelMap {
    for (index, (label, value)) in entries.iter().enumerate() {
      for (other_label, other_value) in &entries[..index] {
        assert!(label != other_label, "duplicate filter label: {}", label);
        if let (Some(value), Some(other_value)) = (value, other_value) {
          assert!(value != other_value, "duplicate filter value: {}", value);
        }
      }
    }
    LabelMap {
      entries: entries.to_vec(),
    }
  }

  pub fn value_for_label(&self, label: &str) -> Option<Option<&'static str>> {
    self
      .entries
      .iter()
      .find(|(entry_label, _)| *entry_label == label)
      .map(|(_, value)| *value)
  }

  pub fn label_for_value(&self, value: &str) -> Option<&'static str> {
    self
      .entries
      .iter()
      .find(|(_, entry_value)| *entry_value == Some(value))
      .map(|(label, _)| *label)
  }

  pub fn labels(&self) -> Vec<&'static str> {
    self.entries.iter().map(|(label, _)| *label).collect()
  }
}

pub struct SetCodeMap {
  entries: Vec<(&'static str, &'static str)>,
}

impl SetCodeMap {
  fn new(entries: &[(&'static str, &'static str)]) -> SetCodeMap {
    for (index, (code, prefix)) in entries.iter().enumerate() {
      for (other_code, other_prefix) in &entries[..index] {
        assert!(code != other_code, "duplicate set code: {}", code);
        assert!(prefix != other_prefix, "duplicate set prefix: {}", prefix);
      }
    }
    SetCodeMap {
      entries: entries.to_vec(),
    }
  }

  pub fn prefix_for_code(&self, code: &str) -> Option<&'static str> {
    let upper = code.to_uppercase();
    self
      .entries
      .iter()
      .find(|(entry_code, _)| *entry_code == upper)
      .map(|(_, prefix)| *prefix)
  }

  pub fn code_for_prefix(&self, prefix: &str) -> Option<&'static str> {
    self
      .entries
      .iter()
      .find(|(_, entry_prefix)| *entry_prefix == prefix)
      .map(|(code, _)| *code)
  }

  pub fn contains_code(&self, code: &str) -> bool {
    self.prefix_for_code(code).is_some()
  }
}

pub static RARITY_FILTERS: Lazy<LabelMap> = Lazy::new(|| {
  LabelMap::new(&[
    ("Todos", None),
    ("● Común", Some("Common")),
    ("♦ Poco Común", Some("Uncommon")),
    ("★ Rara", Some("Rare")),
    ("★★ Double Rare", Some("Double Rare")),
    ("★★★ Ultra Rara", Some("Ultra Rare")),
    ("ACE SPEC", Some("ACE SPEC")),
  ])
});

pub static TYPE_FILTERS: Lazy<LabelMap> = Lazy::new(|| {
  LabelMap::new(&[
    ("Todos", None),
    ("Fuego", Some("Fire")),
    ("Agua", Some("Water")),
    ("Planta", Some("Grass")),
    ("Eléctrico", Some("Lightning")),
    ("Psíquico", Some("Psychic")),
    ("Lucha", Some("Fighting")),
    ("Oscuridad", Some("Darkness")),
    ("Metal", Some("Metal")),
    ("Entrenador", Some("")),
  ])
});

pub static SET_CODES: Lazy<SetCodeMap> = Lazy::new(|| {
  SetCodeMap::new(&[
    ("SVI", "sv1"),
    ("PAL", "sv2"),
    ("OBF", "sv3"),
    ("151", "sv3pt5"),
    ("PAR", "sv4"),
    ("PAF", "sv4pt5"),
    ("TEF", "sv5"),
    ("TWM", "sv6"),
    ("SFA", "sv6pt5"),
    ("SCR", "sv7"),
    ("SSP", "sv8"),
    ("PRE", "sv8pt5"),
    ("SVE", "sve"),
  ])
});

static DECK_LINE_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(\d+)\s+(.+?)\s+([A-Za-z0-9]+)\s+(\d+)$").expect("valid deck line pattern"));

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCardDto {
  pub card_id: String,
  pub name: String,
  pub set_id: String,
  pub set_name: String,
  pub number: String,
  pub quantity: i64,
  pub rarity: String,
  pub card_type: String,
  pub supertype: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuantityUpdateDto {
  pub card_id: String,
  pub quantity: i64,
  pub changed: bool,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatsDto {
  pub total_cards: i64,
  pub owned_cards: i64,
  pub total_quantity: i64,
  pub deck_count: i64,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeckDto {
  pub deck_id: String,
  pub deck_name: String,
  pub deck_text: String,
  pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeckLineItem {
  pub quantity: i64,
  pub name: String,
  pub set_code: String,
  pub number: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeckLine {
  Matched(DeckLineItem),
  Skipped(String),
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EnergyCountDto {
  pub name: String,
  pub quantity: i64,
}

#[derive(Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeckSummaryDto {
  pub pokemon_count: i64,
  pub trainer_count: i64,
  pub energy_count: i64,
  pub energy_types: Vec<EnergyCountDto>,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeckCardDto {
  pub card_id: String,
  pub name: String,
  pub quantity: i64,
  pub image_path: String,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeckViewDto {
  pub cards: Vec<DeckCardDto>,
  pub summary: DeckSummaryDto,
}

#[derive(Deserialize)]
pub struct ApiSetDto {
  pub id: String,
  pub name: String,
}

#[derive(Deserialize)]
pub struct ApiImagesDto {
  pub small: String,
}

#[derive(Deserialize)]
pub struct ApiCardDto {
  pub id: String,
  pub name: String,
  pub number: String,
  pub rarity: Option<String>,
  pub types: Option<Vec<String>>,
  pub supertype: Option<String>,
  pub set: ApiSetDto,
  pub images: ApiImagesDto,
}

#[derive(Deserialize)]
pub struct CardsPageDto {
  pub data: Vec<ApiCardDto>,
}

#[derive(Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncReportDto {
  pub sets_requested: i64,
  pub sets_completed: i64,
  pub cards_seen: i64,
  pub cards_inserted: i64,
  pub images_downloaded: i64,
  pub images_skipped: i64,
  pub images_failed: i64,
}

fn now_iso() -> String {
  Utc::now().to_rfc3339()
}

pub fn init_database(db_path: &Path) -> Result<()> {
  if let Some(parent) = db_path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)?;
    }
  }

  let connection = Connection::open(db_path)?;
  connection.execute_batch("PRAGMA foreign_keys = ON;")?;
  connection.execute_batch(MIGRATION_SQL_0001)?;
  connection.execute_batch(MIGRATION_SQL_0002)?;
  Ok(())
}

pub fn open_database(db_path: &Path) -> Result<Connection> {
  let connection = Connection::open(db_path)?;
  connection.execute_batch("PRAGMA foreign_keys = ON;")?;
  Ok(connection)
}

pub fn load_collection_rows(connection: &Connection) -> Result<Vec<CollectionCardDto>> {
  let mut statement = connection.prepare(
    "SELECT c.card_id, c.name, c.set_id, c.set_name, c.number, m.quantity, c.rarity, c.type, c.supertype
     FROM cards c
     JOIN my_collection m ON c.card_id = m.card_id
     ORDER BY c.set_id, CAST(c.number AS INTEGER)",
  )?;

  let rows = statement.query_map([], |row| {
    Ok(CollectionCardDto {
      card_id: row.get(0)?,
      name: row.get(1)?,
      set_id: row.get(2)?,
      set_name: row.get(3)?,
      number: row.get(4)?,
      quantity: row.get(5)?,
      rarity: row.get(6)?,
      card_type: row.get(7)?,
      supertype: row.get(8)?,
    })
  })?;

  let mut cards = Vec::new();
  for row in rows {
    cards.push(row?);
  }

  Ok(cards)
}

pub fn find_card(connection: &Connection, card_id: &str) -> Result<Option<CollectionCardDto>> {
  let card = connection
    .query_row(
      "SELECT c.card_id, c.name, c.set_id, c.set_name, c.number, m.quantity, c.rarity, c.type, c.supertype
       FROM cards c
       JOIN my_collection m ON c.card_id = m.card_id
       WHERE c.card_id = ?1
       LIMIT 1",
      params![card_id],
      |row| {
        Ok(CollectionCardDto {
          card_id: row.get(0)?,
          name: row.get(1)?,
          set_id: row.get(2)?,
          set_name: row.get(3)?,
          number: row.get(4)?,
          quantity: row.get(5)?,
          rarity: row.get(6)?,
          card_type: row.get(7)?,
          supertype: row.get(8)?,
        })
      },
    )
    .optional()?;

  Ok(card)
}

#[derive(Clone, Default)]
pub struct CardFilter {
  name: Option<String>,
  set_name: Option<String>,
  min_quantity: i64,
  rarity: Option<&'static str>,
  card_type: Option<&'static str>,
}

impl CardFilter {
  pub fn from_labels(
    name: &str,
    set_name: &str,
    min_quantity: i64,
    rarity_label: &str,
    type_label: &str,
  ) -> Result<CardFilter> {
    let Some(rarity) = RARITY_FILTERS.value_for_label(rarity_label) else {
      bail!("unknown rarity filter: {}", rarity_label);
    };
    let Some(card_type) = TYPE_FILTERS.value_for_label(type_label) else {
      bail!("unknown type filter: {}", type_label);
    };

    let name = name.trim().to_lowercase();
    let set_name = set_name.trim();
    Ok(CardFilter {
      name: if name.is_empty() { None } else { Some(name) },
      set_name: if set_name.is_empty() || set_name == "Todos" {
        None
      } else {
        Some(set_name.to_string())
      },
      min_quantity: min_quantity.max(0),
      rarity,
      card_type,
    })
  }

  pub fn matches(&self, card: &CollectionCardDto) -> bool {
    if let Some(needle) = &self.name {
      if !card.name.to_lowercase().contains(needle) {
        return false;
      }
    }
    if let Some(set_name) = &self.set_name {
      if card.set_name != *set_name {
        return false;
      }
    }
    if card.quantity < self.min_quantity {
      return false;
    }
    if let Some(rarity) = self.rarity {
      if card.rarity != rarity {
        return false;
      }
    }
    if let Some(card_type) = self.card_type {
      if card.card_type != card_type {
        return false;
      }
    }
    true
  }
}

pub fn filter_cards(cards: &[CollectionCardDto], filter: &CardFilter) -> Vec<CollectionCardDto> {
  cards.iter().filter(|card| filter.matches(card)).cloned().collect()
}

pub fn update_quantity(connection: &Connection, card_id: &str, quantity: i64) -> Result<QuantityUpdateDto> {
  if quantity < 0 {
    bail!("quantity cannot be negative: {}", quantity);
  }

  let current: Option<i64> = connection
    .query_row(
      "SELECT quantity FROM my_collection WHERE card_id = ?1",
      params![card_id],
      |row| row.get(0),
    )
    .optional()?;

  let Some(current) = current else {
    bail!("card not found in collection: {}", card_id);
  };

  if current == quantity {
    return Ok(QuantityUpdateDto {
      card_id: card_id.to_string(),
      quantity,
      changed: false,
    });
  }

  connection.execute(
    "UPDATE my_collection SET quantity = ?1 WHERE card_id = ?2",
    params![quantity, card_id],
  )?;

  Ok(QuantityUpdateDto {
    card_id: card_id.to_string(),
    quantity,
    changed: true,
  })
}

pub fn energy_display_name(name: &str) -> &str {
  name.strip_suffix(" Energy").unwrap_or(name)
}

pub fn display_type(card: &CollectionCardDto) -> String {
  if card.supertype.as_deref() == Some("Energy") {
    return energy_display_name(&card.name).to_string();
  }
  if card.card_type.is_empty() {
    "N/A".to_string()
  } else {
    card.card_type.clone()
  }
}

pub fn image_path(image_dir: &Path, card_id: &str) -> PathBuf {
  image_dir.join(format!("{}.png", card_id))
}

fn csv_field(value: &str) -> String {
  if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}

pub fn export_collection_csv(connection: &Connection, output_path: &Path) -> Result<usize> {
  let mut statement = connection.prepare(
    "SELECT c.card_id, c.name, c.set_name, m.quantity, c.rarity, c.type
     FROM cards c
     JOIN my_collection m ON c.card_id = m.card_id
     WHERE m.quantity > 0
     ORDER BY c.set_id, CAST(c.number AS INTEGER)",
  )?;

  let rows = statement.query_map([], |row| {
    Ok((
      row.get::<usize, String>(0)?,
      row.get::<usize, String>(1)?,
      row.get::<usize, String>(2)?,
      row.get::<usize, i64>(3)?,
      row.get::<usize, String>(4)?,
      row.get::<usize, String>(5)?,
    ))
  })?;

  let mut body = String::new();
  body.push_str(&CSV_HEADER.join(","));
  body.push_str("\r\n");

  let mut exported = 0usize;
  for row in rows {
    let (card_id, name, set_name, quantity, rarity, card_type) = row?;
    let fields = [
      csv_field(&card_id),
      csv_field(&name),
      csv_field(&set_name),
      quantity.to_string(),
      csv_field(&rarity),
      csv_field(&card_type),
    ];
    body.push_str(&fields.join(","));
    body.push_str("\r\n");
    exported += 1;
  }

  fs::write(output_path, body)?;
  Ok(exported)
}

pub fn collection_stats(connection: &Connection) -> Result<CollectionStatsDto> {
  let total_cards: i64 = connection.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
  let owned_cards: i64 = connection.query_row(
    "SELECT COUNT(*) FROM my_collection WHERE quantity > 0",
    [],
    |row| row.get(0),
  )?;
  let total_quantity: i64 = connection.query_row(
    "SELECT COALESCE(SUM(quantity), 0) FROM my_collection",
    [],
    |row| row.get(0),
  )?;
  let deck_count: i64 = connection.query_row("SELECT COUNT(*) FROM decks", [], |row| row.get(0))?;

  Ok(CollectionStatsDto {
    total_cards,
    owned_cards,
    total_quantity,
    deck_count,
  })
}

pub fn create_deck(connection: &Connection, name: &str, text: &str) -> Result<DeckDto> {
  let name = name.trim();
  if name.is_empty() {
    bail!("deck name is required");
  }
  let text = text.trim();
  if text.is_empty() {
    bail!("deck text is empty");
  }

  let deck = DeckDto {
    deck_id: Uuid::new_v4().to_string(),
    deck_name: name.to_string(),
    deck_text: text.to_string(),
    created_at: now_iso(),
  };

  connection.execute(
    "INSERT INTO decks (deck_id, deck_name, deck_text, created_at) VALUES (?1, ?2, ?3, ?4)",
    params![deck.deck_id, deck.deck_name, deck.deck_text, deck.created_at],
  )?;

  Ok(deck)
}

pub fn list_decks(connection: &Connection) -> Result<Vec<DeckDto>> {
  let mut statement = connection.prepare(
    "SELECT deck_id, deck_name, deck_text, created_at
     FROM decks
     ORDER BY created_at, deck_id",
  )?;

  let rows = statement.query_map([], |row| {
    Ok(DeckDto {
      deck_id: row.get(0)?,
      deck_name: row.get(1)?,
      deck_text: row.get(2)?,
      created_at: row.get(3)?,
    })
  })?;

  let mut decks = Vec::new();
  for row in rows {
    decks.push(row?);
  }

  Ok(decks)
}

pub fn find_deck(connection: &Connection, deck_id: &str) -> Result<Option<DeckDto>> {
  let deck = connection
    .query_row(
      "SELECT deck_id, deck_name, deck_text, created_at
       FROM decks
       WHERE deck_id = ?1
       LIMIT 1",
      params![deck_id],
      |row| {
        Ok(DeckDto {
          deck_id: row.get(0)?,
          deck_name: row.get(1)?,
          deck_text: row.get(2)?,
          created_at: row.get(3)?,
        })
      },
    )
    .optional()?;

  Ok(deck)
}

pub fn delete_deck(connection: &Connection, deck_id: &str) -> Result<bool> {
  let deleted = connection.execute("DELETE FROM decks WHERE deck_id = ?1", params![deck_id])?;
  Ok(deleted > 0)
}

pub fn parse_deck_line(line: &str) -> DeckLine {
  if let Some(captures) = DECK_LINE_RE.captures(line.trim()) {
    if let Ok(quantity) = captures[1].parse::<i64>() {
      return DeckLine::Matched(DeckLineItem {
        quantity,
        name: captures[2].to_string(),
        set_code: captures[3].to_string(),
        number: captures[4].to_string(),
      });
    }
  }
  DeckLine::Skipped(line.to_string())
}

pub fn parse_deck_lines(text: &str) -> Vec<DeckLine> {
  text.lines().map(parse_deck_line).collect()
}

pub fn parse_deck_text(text: &str) -> Vec<DeckLineItem> {
  parse_deck_lines(text)
    .into_iter()
    .filter_map(|line| match line {
      DeckLine::Matched(item) => Some(item),
      DeckLine::Skipped(_) => None,
    })
    .collect()
}

pub fn derive_card_id(set_code: &str, number: &str) -> String {
  let prefix = match SET_CODES.prefix_for_code(set_code) {
    Some(prefix) => prefix.to_string(),
    None => set_code.to_lowercase(),
  };
  format!("{}-{}", prefix, number)
}

pub fn load_supertype_index(connection: &Connection) -> Result<HashMap<String, String>> {
  let mut statement = connection.prepare(
    "SELECT card_id, supertype
     FROM cards
     WHERE supertype IS NOT NULL AND supertype != ''",
  )?;

  let rows = statement.query_map([], |row| {
    Ok((row.get::<usize, String>(0)?, row.get::<usize, String>(1)?))
  })?;

  let mut index = HashMap::new();
  for row in rows {
    let (card_id, supertype) = row?;
    index.insert(card_id, supertype);
  }

  Ok(index)
}

pub fn classify_line(item: &DeckLineItem, supertypes: &HashMap<String, String>) -> String {
  let card_id = derive_card_id(&item.set_code, &item.number);
  if let Some(supertype) = supertypes.get(&card_id) {
    return supertype.clone();
  }
  if item.name.contains("Energy") {
    return "Energy".to_string();
  }
  if SET_CODES.contains_code(&item.set_code) {
    return "Pokémon".to_string();
  }
  "Trainer".to_string()
}

pub fn summarize_deck(items: &[DeckLineItem], supertypes: &HashMap<String, String>) -> DeckSummaryDto {
  let mut summary = DeckSummaryDto::default();

  for item in items {
    match classify_line(item, supertypes).as_str() {
      "Pokémon" => summary.pokemon_count += item.quantity,
      "Trainer" => summary.trainer_count += item.quantity,
      "Energy" => {
        summary.energy_count += item.quantity;
        let energy_name = energy_display_name(&item.name);
        match summary
          .energy_types
          .iter_mut()
          .find(|entry| entry.name == energy_name)
        {
          Some(entry) => entry.quantity += item.quantity,
          None => summary.energy_types.push(EnergyCountDto {
            name: energy_name.to_string(),
            quantity: item.quantity,
          }),
        }
      }
      _ => {}
    }
  }

  summary
}

pub fn build_deck_view(connection: &Connection, image_dir: &Path, deck_text: &str) -> Result<DeckViewDto> {
  let items = parse_deck_text(deck_text);
  let supertypes = load_supertype_index(connection)?;
  let summary = summarize_deck(&items, &supertypes);

  let mut cards = Vec::new();
  for item in &items {
    let card_id = derive_card_id(&item.set_code, &item.number);
    let path = image_path(image_dir, &card_id);
    if path.exists() {
      cards.push(DeckCardDto {
        card_id,
        name: item.name.clone(),
        quantity: item.quantity,
        image_path: path.display().to_string(),
      });
    } else {
      log::warn!("image not found: {}", path.display());
    }
  }

  Ok(DeckViewDto { cards, summary })
}

pub fn build_api_client() -> Result<Client> {
  let client = Client::builder()
    .timeout(Duration::from_secs(API_TIMEOUT_SECONDS))
    .build()?;
  Ok(client)
}

fn fetch_cards_page(client: &Client, api_key: &str, set_id: &str, page: usize) -> Result<Vec<ApiCardDto>> {
  let url = format!(
    "{}?q=set.id:{}&page={}&pageSize={}",
    API_CARDS_URL, set_id, page, API_PAGE_SIZE
  );

  let response = client.get(&url).header("X-Api-Key", api_key).send()?;
  if !response.status().is_success() {
    bail!("card request failed with status {}", response.status());
  }

  let body = response.text()?;
  let payload: CardsPageDto = serde_json::from_str(&body)?;
  Ok(payload.data)
}

pub fn fetch_set_cards(client: &Client, api_key: &str, set_id: &str) -> (Vec<ApiCardDto>, bool) {
  let mut all_cards = Vec::new();
  let mut page = 1;

  loop {
    match fetch_cards_page(client, api_key, set_id, page) {
      Ok(cards) => {
        let fetched = cards.len();
        all_cards.extend(cards);
        if fetched < API_PAGE_SIZE {
          return (all_cards, true);
        }
        page += 1;
        thread::sleep(Duration::from_millis(API_PAGE_DELAY_MS));
      }
      Err(error) => {
        log::warn!("failed to fetch {} page {}: {}", set_id, page, error);
        return (all_cards, false);
      }
    }
  }
}

pub fn upsert_card(connection: &Connection, card: &ApiCardDto) -> Result<bool> {
  let rarity = card.rarity.clone().unwrap_or_default();
  let card_type = card
    .types
    .as_ref()
    .and_then(|types| types.first())
    .cloned()
    .unwrap_or_default();

  let inserted = connection.execute(
    "INSERT OR IGNORE INTO cards (card_id, name, set_id, set_name, number, rarity, type, supertype, image_url)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    params![
      card.id,
      card.name,
      card.set.id,
      card.set.name,
      card.number,
      rarity,
      card_type,
      card.supertype,
      card.images.small
    ],
  )?;

  Ok(inserted > 0)
}

pub fn ensure_collection_entry(connection: &Connection, card_id: &str) -> Result<()> {
  connection.execute(
    "INSERT OR IGNORE INTO my_collection (card_id, quantity) VALUES (?1, 0)",
    params![card_id],
  )?;
  Ok(())
}

pub fn download_card_image(client: &Client, image_dir: &Path, card_id: &str, image_url: &str) -> Result<bool> {
  let path = image_path(image_dir, card_id);
  if path.exists() {
    return Ok(false);
  }

  let response = client.get(image_url).send()?;
  if !response.status().is_success() {
    bail!("image request failed with status {}", response.status());
  }

  let bytes = response.bytes()?;
  fs::write(&path, &bytes)?;
  Ok(true)
}

pub fn sync_sets(
  connection: &mut Connection,
  client: &Client,
  api_key: &str,
  set_ids: &[String],
  image_dir: &Path,
) -> Result<SyncReportDto> {
  fs::create_dir_all(image_dir)?;

  let mut report = SyncReportDto {
    sets_requested: set_ids.len() as i64,
    ..SyncReportDto::default()
  };

  for set_id in set_ids {
    log::info!("fetching cards for set {}", set_id);
    let (set_cards, completed) = fetch_set_cards(client, api_key, set_id);
    report.cards_seen += set_cards.len() as i64;

    let tx = connection.transaction()?;
    for card in &set_cards {
      if upsert_card(&tx, card)? {
        report.cards_inserted += 1;
      }
      ensure_collection_entry(&tx, &card.id)?;
    }
    tx.commit()?;

    for card in &set_cards {
      match download_card_image(client, image_dir, &card.id, &card.images.small) {
        Ok(true) => report.images_downloaded += 1,
        Ok(false) => report.images_skipped += 1,
        Err(error) => {
          log::warn!("failed to download image for {}: {}", card.id, error);
          report.images_failed += 1;
        }
      }
    }

    if completed {
      report.sets_completed += 1;
    }
  }

  Ok(report)
}
