//! Anki collection schema (version 11) and the JSON blobs stored in `col`

use serde_json::{json, Map, Value};

/// Id of the cloze note type; the same id genanki uses, so cards from this
/// tool and from genanki decks share one note type in Anki.
pub const CLOZE_MODEL_ID: i64 = 998877661;

pub const SCHEMA_VERSION: i64 = 11;

/// Tables and indexes of a `collection.anki2` file
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE col (
    id      integer primary key,
    crt     integer not null,
    mod     integer not null,
    scm     integer not null,
    ver     integer not null,
    dty     integer not null,
    usn     integer not null,
    ls      integer not null,
    conf    text not null,
    models  text not null,
    decks   text not null,
    dconf   text not null,
    tags    text not null
);
CREATE TABLE notes (
    id      integer primary key,
    guid    text not null,
    mid     integer not null,
    mod     integer not null,
    usn     integer not null,
    tags    text not null,
    flds    text not null,
    sfld    integer not null,
    csum    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE cards (
    id      integer primary key,
    nid     integer not null,
    did     integer not null,
    ord     integer not null,
    mod     integer not null,
    usn     integer not null,
    type    integer not null,
    queue   integer not null,
    due     integer not null,
    ivl     integer not null,
    factor  integer not null,
    reps    integer not null,
    lapses  integer not null,
    left    integer not null,
    odue    integer not null,
    odid    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE revlog (
    id      integer primary key,
    cid     integer not null,
    usn     integer not null,
    ease    integer not null,
    ivl     integer not null,
    lastIvl integer not null,
    factor  integer not null,
    time    integer not null,
    type    integer not null
);
CREATE TABLE graves (
    usn     integer not null,
    oid     integer not null,
    type    integer not null
);
CREATE INDEX ix_notes_usn ON notes (usn);
CREATE INDEX ix_cards_usn ON cards (usn);
CREATE INDEX ix_revlog_usn ON revlog (usn);
CREATE INDEX ix_cards_nid ON cards (nid);
CREATE INDEX ix_cards_sched ON cards (did, queue, due);
CREATE INDEX ix_revlog_cid ON revlog (cid);
CREATE INDEX ix_notes_csum ON notes (csum);
"#;

const CLOZE_CSS: &str = ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n\n.cloze {\n font-weight: bold;\n color: blue;\n}\n.nightMode .cloze {\n color: lightblue;\n}";

const LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";

const LATEX_POST: &str = "\\end{document}";

/// Collection-wide settings (`col.conf`)
pub fn collection_conf(deck_id: i64) -> Value {
    json!({
        "activeDecks": [deck_id],
        "addToCur": true,
        "collapseTime": 1200,
        "curDeck": deck_id,
        "curModel": CLOZE_MODEL_ID.to_string(),
        "dueCounts": true,
        "estTimes": true,
        "newBury": true,
        "newSpread": 0,
        "nextPos": 1,
        "sortBackwards": false,
        "sortType": "noteFld",
        "timeLim": 0
    })
}

fn field(name: &str, ord: u32) -> Value {
    json!({
        "name": name,
        "ord": ord,
        "font": "Arial",
        "media": [],
        "rtl": false,
        "size": 20,
        "sticky": false
    })
}

/// Note types (`col.models`): one cloze type with `Text` and `Back Extra`
pub fn models(deck_id: i64, modified: i64) -> Value {
    let model = json!({
        "id": CLOZE_MODEL_ID,
        "name": "Cloze (ko2anki)",
        "type": 1,
        "mod": modified,
        "usn": -1,
        "sortf": 0,
        "did": deck_id,
        "tags": [],
        "vers": [],
        "css": CLOZE_CSS,
        "latexPre": LATEX_PRE,
        "latexPost": LATEX_POST,
        "flds": [field("Text", 0), field("Back Extra", 1)],
        "tmpls": [{
            "name": "Cloze",
            "ord": 0,
            "qfmt": "{{cloze:Text}}",
            "afmt": "{{cloze:Text}}<br>\n{{Back Extra}}",
            "bqfmt": "",
            "bafmt": "",
            "did": null
        }],
        "req": [[0, "any", [0]]]
    });
    let mut models = Map::new();
    models.insert(CLOZE_MODEL_ID.to_string(), model);
    Value::Object(models)
}

fn deck_entry(id: i64, name: &str, modified: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "conf": 1,
        "dyn": 0,
        "collapsed": false,
        "extendNew": 10,
        "extendRev": 50,
        "mod": modified,
        "usn": -1,
        "newToday": [0, 0],
        "revToday": [0, 0],
        "lrnToday": [0, 0],
        "timeToday": [0, 0]
    })
}

/// Decks (`col.decks`): Anki's mandatory `Default` deck plus ours
pub fn decks(deck_id: i64, name: &str, modified: i64) -> Value {
    let mut decks = Map::new();
    decks.insert("1".to_string(), deck_entry(1, "Default", modified));
    decks.insert(deck_id.to_string(), deck_entry(deck_id, name, modified));
    Value::Object(decks)
}

/// Deck options (`col.dconf`)
pub fn deck_config() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "autoplay": true,
            "maxTaken": 60,
            "mod": 0,
            "usn": 0,
            "replayq": true,
            "timer": 0,
            "dyn": false,
            "lapse": {
                "delays": [10],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0
            },
            "new": {
                "bury": true,
                "delays": [1, 10],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            }
        }
    })
}
