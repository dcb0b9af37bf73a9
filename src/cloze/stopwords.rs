//! Stopword lists for the languages KOReader books commonly use.
//!
//! Words in these lists are never chosen as the cloze blank.

use std::collections::HashSet;
use std::sync::OnceLock;

const ENGLISH: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
    "with", "about", "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
    "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
    "only", "own", "same", "so", "than", "too", "very", "can", "will", "just", "don", "should",
    "now", "would", "could", "also", "into", "upon", "shall", "might", "must", "whose", "every",
    "even", "many", "much", "yet", "still", "ever", "never", "often", "however", "therefore",
];

const FRENCH: &[&str] = &[
    "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "du", "elle", "en", "et", "eux", "il",
    "ils", "je", "la", "le", "les", "leur", "lui", "ma", "mais", "me", "même", "mes", "moi",
    "mon", "ne", "nos", "notre", "nous", "on", "ou", "par", "pas", "pour", "qu", "que", "qui",
    "sa", "se", "ses", "son", "sur", "ta", "te", "tes", "toi", "ton", "tu", "un", "une", "vos",
    "votre", "vous", "été", "étée", "étées", "étés", "étant", "suis", "es", "est", "sommes",
    "êtes", "sont", "serai", "sera", "serons", "seront", "serait", "seraient", "était",
    "étaient", "fut", "furent", "soit", "soient", "ai", "as", "avons", "avez", "ont", "aurai",
    "aura", "aurons", "auront", "aurait", "auraient", "avais", "avait", "avions", "aviez",
    "avaient", "eut", "eurent", "ayant", "cette", "cela", "comme", "dont", "aussi", "alors",
    "très", "plus", "tout", "tous", "toute", "toutes", "sans", "sous", "entre", "encore",
];

const GERMAN: &[&str] = &[
    "aber", "alle", "allem", "allen", "aller", "alles", "als", "also", "am", "an", "ander",
    "andere", "anderem", "anderen", "anderer", "anderes", "auch", "auf", "aus", "bei", "bin",
    "bis", "bist", "da", "damit", "dann", "der", "den", "des", "dem", "die", "das", "dass",
    "dein", "deine", "denn", "derselbe", "dich", "dir", "doch", "dort", "durch", "ein", "eine",
    "einem", "einen", "einer", "eines", "einige", "einmal", "er", "es", "etwas", "euch", "euer",
    "für", "gegen", "gewesen", "hab", "habe", "haben", "hat", "hatte", "hatten", "hier", "hin",
    "hinter", "ich", "ihm", "ihn", "ihnen", "ihr", "ihre", "im", "in", "indem", "ins", "ist",
    "jede", "jedem", "jeden", "jeder", "jedes", "jene", "jetzt", "kann", "kein", "keine",
    "können", "könnte", "machen", "man", "manche", "mein", "meine", "mich", "mir", "mit", "muss",
    "musste", "nach", "nicht", "nichts", "noch", "nun", "nur", "ob", "oder", "ohne", "sehr",
    "sein", "seine", "selbst", "sich", "sie", "sind", "so", "solche", "soll", "sollte",
    "sondern", "sonst", "über", "um", "und", "uns", "unser", "unter", "viel", "vom", "von",
    "vor", "während", "war", "waren", "warst", "was", "weg", "weil", "weiter", "welche", "wenn",
    "werde", "werden", "wie", "wieder", "will", "wir", "wird", "wirst", "wo", "wollen", "wollte",
    "würde", "würden", "zu", "zum", "zur", "zwar", "zwischen",
];

const SPANISH: &[&str] = &[
    "de", "la", "que", "el", "en", "y", "a", "los", "del", "se", "las", "por", "un", "para",
    "con", "no", "una", "su", "al", "lo", "como", "más", "pero", "sus", "le", "ya", "o", "este",
    "sí", "porque", "esta", "entre", "cuando", "muy", "sin", "sobre", "también", "me", "hasta",
    "hay", "donde", "quien", "desde", "todo", "nos", "durante", "todos", "uno", "les", "ni",
    "contra", "otros", "ese", "eso", "ante", "ellos", "e", "esto", "mí", "antes", "algunos",
    "qué", "unos", "yo", "otro", "otras", "otra", "él", "tanto", "esa", "estos", "mucho",
    "quienes", "nada", "muchos", "cual", "poco", "ella", "estar", "estas", "algunas", "algo",
    "nosotros", "mi", "mis", "tú", "te", "ti", "tu", "tus", "ellas", "vosotros", "os", "mío",
    "mía", "tuyo", "suyo", "nuestro", "vuestro", "es", "son", "fue", "era", "eran", "ser",
    "sido", "siendo", "tiene", "tienen", "había", "han", "ha", "habían", "hace", "puede",
];

const ITALIAN: &[&str] = &[
    "ad", "al", "allo", "ai", "agli", "all", "alla", "alle", "con", "col", "coi", "da", "dal",
    "dallo", "dai", "dagli", "dalla", "dalle", "di", "del", "dello", "dei", "degli", "della",
    "delle", "in", "nel", "nello", "nei", "negli", "nella", "nelle", "su", "sul", "sullo",
    "sui", "sugli", "sulla", "sulle", "per", "tra", "contro", "io", "tu", "lui", "lei", "noi",
    "voi", "loro", "mio", "mia", "miei", "mie", "tuo", "tua", "tuoi", "tue", "suo", "sua",
    "suoi", "sue", "nostro", "nostra", "nostri", "nostre", "vostro", "vostra", "vostri",
    "vostre", "mi", "ti", "ci", "vi", "lo", "la", "li", "le", "gli", "ne", "il", "un", "uno",
    "una", "ma", "ed", "se", "perché", "anche", "come", "dov", "dove", "che", "chi", "cui",
    "non", "più", "quale", "quanto", "quanti", "quanta", "quante", "quello", "quelli",
    "quella", "quelle", "questo", "questi", "questa", "queste", "si", "tutto", "tutti", "sono",
    "era", "erano", "essere", "stato", "stata", "avere", "aveva", "hanno", "molto", "ogni",
];

/// Stopwords for a KOReader language code (`en`, `en-US`, `fre`, ...).
///
/// Unknown languages fall back to English, the same default the reader uses.
pub fn stopwords_for(language: &str) -> &'static HashSet<&'static str> {
    static ENGLISH_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    static FRENCH_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    static GERMAN_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    static SPANISH_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    static ITALIAN_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();

    let (cell, words) = match primary_subtag(language).as_str() {
        "fr" | "fre" | "fra" | "french" => (&FRENCH_SET, FRENCH),
        "de" | "ger" | "deu" | "german" => (&GERMAN_SET, GERMAN),
        "es" | "spa" | "spanish" => (&SPANISH_SET, SPANISH),
        "it" | "ita" | "italian" => (&ITALIAN_SET, ITALIAN),
        _ => (&ENGLISH_SET, ENGLISH),
    };
    cell.get_or_init(|| words.iter().copied().collect())
}

fn primary_subtag(language: &str) -> String {
    language
        .trim()
        .split(&['-', '_'][..])
        .next()
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_matching() {
        assert!(stopwords_for("en-US").contains("the"));
        assert!(stopwords_for("fr").contains("avec"));
        assert!(stopwords_for("de_DE").contains("und"));
        assert!(stopwords_for("es").contains("porque"));
        assert!(stopwords_for("ita").contains("perché"));
    }

    #[test]
    fn test_unknown_language_uses_english() {
        assert!(std::ptr::eq(stopwords_for("xx"), stopwords_for("en")));
        assert!(std::ptr::eq(stopwords_for(""), stopwords_for("en")));
    }
}
