//! Typed views of the four JSON blobs in the `col` row. Key names and value
//! shapes mirror what Anki desktop writes; the structs (de)serialize at the
//! repository boundary so no untyped maps travel further into the core.

use crate::model::{BASIC_MODEL_ID, DEFAULT_DECK_ID, DeckId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `col.conf`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ColConf {
    #[serde(rename = "activeDecks")]
    pub active_decks: Vec<DeckId>,
    #[serde(rename = "addToCur")]
    pub add_to_cur: bool,
    #[serde(rename = "collapseTime")]
    pub collapse_time: i64,
    #[serde(rename = "curDeck")]
    pub cur_deck: DeckId,
    #[serde(rename = "curModel")]
    pub cur_model: String,
    #[serde(rename = "dueCounts")]
    pub due_counts: bool,
    #[serde(rename = "estTimes")]
    pub est_times: bool,
    #[serde(rename = "newBury")]
    pub new_bury: bool,
    #[serde(rename = "newSpread")]
    pub new_spread: i64,
    #[serde(rename = "nextPos")]
    pub next_pos: i64,
    #[serde(rename = "sortBackwards")]
    pub sort_backwards: bool,
    #[serde(rename = "sortType")]
    pub sort_type: String,
    #[serde(rename = "timeLim")]
    pub time_lim: i64,
    /// Day offset (since `col.crt`) of the last bury reset.
    #[serde(rename = "lastUnburied", default)]
    pub last_unburied: i64,
}

impl ColConf {
    pub fn initial() -> Self {
        Self {
            active_decks: vec![DEFAULT_DECK_ID],
            add_to_cur: true,
            collapse_time: 1200,
            cur_deck: DEFAULT_DECK_ID,
            cur_model: BASIC_MODEL_ID.to_string(),
            due_counts: true,
            est_times: true,
            new_bury: true,
            new_spread: 0,
            next_pos: 1,
            sort_backwards: false,
            sort_type: "noteFld".to_string(),
            time_lim: 0,
            last_unburied: 0,
        }
    }
}

/// One entry of the `col.decks` map (keyed by the deck id as a string).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeckEntry {
    pub collapsed: bool,
    pub conf: i64,
    pub desc: String,
    #[serde(rename = "dyn")]
    pub deck_dyn: i64,
    #[serde(rename = "extendNew")]
    pub extend_new: i64,
    #[serde(rename = "extendRev")]
    pub extend_rev: i64,
    pub id: DeckId,
    #[serde(rename = "lrnToday")]
    pub lrn_today: Vec<i64>,
    #[serde(rename = "mod")]
    pub mtime_secs: i64,
    pub name: String,
    #[serde(rename = "newToday")]
    pub new_today: Vec<i64>,
    #[serde(rename = "revToday")]
    pub rev_today: Vec<i64>,
    #[serde(rename = "timeToday")]
    pub time_today: Vec<i64>,
    pub usn: i64,
}

impl DeckEntry {
    pub fn new(id: DeckId, name: &str, mtime_secs: i64) -> Self {
        Self {
            collapsed: false,
            conf: 1,
            desc: String::new(),
            deck_dyn: 0,
            extend_new: 10,
            extend_rev: 50,
            id,
            lrn_today: vec![0, 0],
            mtime_secs,
            name: name.to_string(),
            new_today: vec![0, 0],
            rev_today: vec![0, 0],
            time_today: vec![0, 0],
            usn: -1,
        }
    }
}

/// One entry of the `col.models` map. The collection carries a single fixed
/// Basic model; the full shape is still written so desktop clients accept it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelEntry {
    pub vers: Vec<serde_json::Value>,
    pub name: String,
    pub tags: Vec<serde_json::Value>,
    pub did: DeckId,
    pub usn: i64,
    pub req: Vec<(usize, String, Vec<usize>)>,
    pub flds: Vec<FieldEntry>,
    pub sortf: i64,
    pub tmpls: Vec<TemplateEntry>,
    #[serde(rename = "mod")]
    pub mtime_secs: i64,
    #[serde(rename = "latexPost")]
    pub latex_post: String,
    #[serde(rename = "type")]
    pub model_type: i64,
    pub id: String,
    pub css: String,
    #[serde(rename = "latexPre")]
    pub latex_pre: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FieldEntry {
    pub name: String,
    pub media: Vec<serde_json::Value>,
    pub sticky: bool,
    pub rtl: bool,
    pub ord: i64,
    pub font: String,
    pub size: i64,
}

impl FieldEntry {
    fn new(name: &str, ord: i64) -> Self {
        Self {
            name: name.to_string(),
            media: vec![],
            sticky: false,
            rtl: false,
            ord,
            font: "Arial".to_string(),
            size: 20,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TemplateEntry {
    pub name: String,
    pub qfmt: String,
    pub did: Option<i64>,
    pub bafmt: String,
    pub afmt: String,
    pub ord: i64,
    pub bqfmt: String,
}

pub fn basic_model(mtime_secs: i64) -> ModelEntry {
    ModelEntry {
        vers: vec![],
        name: "Basic".to_string(),
        tags: vec![],
        did: DEFAULT_DECK_ID,
        usn: -1,
        req: vec![(0, "all".to_string(), vec![0])],
        flds: vec![FieldEntry::new("Front", 0), FieldEntry::new("Back", 1)],
        sortf: 0,
        tmpls: vec![TemplateEntry {
            name: "Card 1".to_string(),
            qfmt: "{{Front}}".to_string(),
            did: None,
            bafmt: String::new(),
            afmt: "{{FrontSide}}<hr id=\"answer\">{{Back}}".to_string(),
            ord: 0,
            bqfmt: String::new(),
        }],
        mtime_secs,
        latex_post: "\\end{document}".to_string(),
        model_type: 0,
        id: BASIC_MODEL_ID.to_string(),
        css: ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n"
            .to_string(),
        latex_pre: "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n"
            .to_string(),
    }
}

/// `new`/`lapse`/`rev` sub-objects of a `col.dconf` entry. The same structs
/// parameterize the scheduler directly.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewConf {
    pub bury: bool,
    /// Learning step delays, in minutes.
    pub delays: Vec<f64>,
    #[serde(rename = "initialFactor")]
    pub initial_factor: i64,
    /// `[graduating, easy, ..]` intervals in days.
    pub ints: Vec<i64>,
    pub order: i64,
    #[serde(rename = "perDay")]
    pub per_day: i64,
    pub separate: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LapseConf {
    /// Relearning step delays, in minutes.
    pub delays: Vec<f64>,
    #[serde(rename = "leechAction")]
    pub leech_action: i64,
    #[serde(rename = "leechFails")]
    pub leech_fails: i64,
    /// Minimum interval (days) after relearning.
    #[serde(rename = "minInt")]
    pub min_int: i64,
    /// Multiplier applied to the pre-lapse interval; 0 resets to `min_int`.
    pub mult: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RevConf {
    pub bury: bool,
    /// Extra growth on Easy.
    pub ease4: f64,
    pub fuzz: f64,
    #[serde(rename = "hardFactor")]
    pub hard_factor: f64,
    /// Global interval multiplier.
    #[serde(rename = "ivlFct")]
    pub ivl_fct: f64,
    #[serde(rename = "maxIvl")]
    pub max_ivl: i64,
    #[serde(rename = "minSpace")]
    pub min_space: i64,
    #[serde(rename = "perDay")]
    pub per_day: i64,
}

/// One entry of the `col.dconf` map.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeckConfEntry {
    pub autoplay: bool,
    pub id: i64,
    pub lapse: LapseConf,
    #[serde(rename = "maxTaken")]
    pub max_taken: i64,
    #[serde(rename = "mod")]
    pub mtime_secs: i64,
    pub name: String,
    pub new: NewConf,
    pub replayq: bool,
    pub rev: RevConf,
    pub timer: i64,
    pub usn: i64,
}

impl DeckConfEntry {
    pub fn initial() -> Self {
        Self {
            autoplay: true,
            id: 1,
            lapse: LapseConf {
                delays: vec![10.0],
                leech_action: 0,
                leech_fails: 8,
                min_int: 1,
                mult: 0.0,
            },
            max_taken: 60,
            mtime_secs: 0,
            name: "Default".to_string(),
            new: NewConf {
                bury: true,
                delays: vec![1.0, 10.0],
                initial_factor: 2500,
                ints: vec![1, 4, 7],
                order: 1,
                per_day: 20,
                separate: true,
            },
            replayq: true,
            rev: RevConf {
                bury: true,
                ease4: 1.3,
                fuzz: 0.05,
                hard_factor: 1.2,
                ivl_fct: 1.0,
                max_ivl: 36500,
                min_space: 1,
                per_day: 100,
            },
            timer: 0,
            usn: 0,
        }
    }
}

/// All four blobs of the single `col` row, decoded.
#[derive(Clone, Debug)]
pub struct ColBlobs {
    pub conf: ColConf,
    pub decks: HashMap<String, DeckEntry>,
    pub dconf: HashMap<String, DeckConfEntry>,
    pub models: HashMap<String, ModelEntry>,
}

impl ColBlobs {
    pub fn deck(&self, id: DeckId) -> Option<&DeckEntry> {
        self.decks.get(&id.to_string())
    }

    pub fn contains_deck(&self, id: DeckId) -> bool {
        self.decks.contains_key(&id.to_string())
    }
}

/// Blobs of a brand-new collection: the Default deck, the Basic model, the
/// default deck configuration.
pub fn initial_blobs(deck_desc: &str, mtime_secs: i64) -> ColBlobs {
    let mut default_deck = DeckEntry::new(DEFAULT_DECK_ID, "Default", mtime_secs);
    default_deck.desc = deck_desc.to_string();
    default_deck.usn = 0;
    ColBlobs {
        conf: ColConf::initial(),
        decks: HashMap::from([(DEFAULT_DECK_ID.to_string(), default_deck)]),
        dconf: HashMap::from([("1".to_string(), DeckConfEntry::initial())]),
        models: HashMap::from([(BASIC_MODEL_ID.to_string(), basic_model(mtime_secs))]),
    }
}
