//! Multilingual tokenization and tag extraction.
//!
//! Tokens: ASCII words (2+ letters), CJK ideograph runs, hiragana runs and
//! katakana runs. Stop words are dropped and synonyms fold onto one canonical tag.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Maximum tags kept per skill.
pub const MAX_TAGS: usize = 30;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]{2,}").expect("word regex is valid"));
static CJK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{4e00}-\x{9fff}]{2,}").expect("cjk regex is valid"));
static HIRAGANA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{3040}-\x{309f}]{2,}").expect("hiragana regex is valid"));
static KATAKANA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{30a0}-\x{30ff}]{2,}").expect("katakana regex is valid"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "has",
    "have", "how", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "our",
    "please", "so", "some", "than", "that", "the", "their", "them", "then", "there", "these",
    "this", "to", "use", "used", "uses", "using", "via", "was", "we", "what", "when", "which",
    "will", "with", "would", "you", "your", "skill", "tool", "help", "want", "need", "should",
    "could", "all", "any", "each", "given", "one", "also", "just", "about", "的", "了", "和",
    "是", "在", "我", "请", "一个", "这个", "什么", "怎么",
];

/// canonical → variants
const SYNONYMS: &[(&str, &[&str])] = &[
    ("convert", &["conversion", "converter", "converting", "transform", "transformation", "转换", "変換"]),
    ("file", &["files", "document", "documents", "doc", "docs", "文件", "文档", "ファイル"]),
    ("text", &["string", "strings", "texts", "文本", "テキスト"]),
    ("delete", &["remove", "removal", "erase", "purge", "删除", "削除"]),
    ("search", &["find", "lookup", "query", "grep", "搜索", "検索"]),
    ("image", &["images", "picture", "photo", "img", "图片", "画像"]),
    ("count", &["counting", "counter", "tally", "统计"]),
    ("web", &["http", "url", "website", "internet", "网页"]),
    ("data", &["dataset", "table", "csv", "spreadsheet", "数据", "データ"]),
    ("code", &["script", "program", "python", "代码", "コード"]),
    ("design", &["ui", "css", "style", "color", "colour", "设计", "デザイン"]),
];

static STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

static SYNONYM_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (canonical, variants) in SYNONYMS {
        map.insert(*canonical, *canonical);
        for v in *variants {
            map.insert(*v, *canonical);
        }
    }
    map
});

/// Raw tokens in order of appearance (ASCII lower-cased).
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens: Vec<String> = WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect();
    for re in [&*CJK_RE, &*HIRAGANA_RE, &*KATAKANA_RE] {
        tokens.extend(re.find_iter(text).map(|m| m.as_str().to_string()));
    }
    tokens
}

fn canonical(token: &str) -> String {
    SYNONYM_MAP
        .get(token)
        .map(|s| s.to_string())
        .unwrap_or_else(|| token.to_string())
}

/// Tokenize, drop stop words, fold synonyms.
pub fn normalized_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !STOP_SET.contains(t.as_str()))
        .map(|t| canonical(&t))
        .collect()
}

/// Normalised token set of a user utterance.
pub fn utterance_tokens(utterance: &str) -> HashSet<String> {
    normalized_tokens(utterance).into_iter().collect()
}

/// Tags for a skill: declared tags, then name tokens, then description tokens.
/// Deduplicated in first-seen order and capped at [`MAX_TAGS`].
pub fn extract_tags(name: &str, description: &str, declared: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    let declared = declared.iter().map(|t| canonical(&t.to_lowercase()));
    let from_name = normalized_tokens(&name.replace(['-', '_'], " "));
    let from_desc = normalized_tokens(description);
    for tag in declared.chain(from_name).chain(from_desc) {
        if tags.len() >= MAX_TAGS {
            break;
        }
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}
