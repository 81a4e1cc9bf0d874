// lib.rs - 库函数

use once_cell::sync::Lazy;
use regex::Regex;

/// 7 个固定分类层级的单字母代码：界 门 纲 目 科 属 种
pub const RANK_CODES: [&str; 7] = ["k", "p", "c", "o", "f", "g", "s"];

/// 要替换为 `上一级_X` 的脏词（不区分大小写，子串匹配）
pub const PLACEHOLDER_WORDS: [&str; 9] = [
    "incertae_sedis",
    "unidentified",
    "unknown",
    "unknown_family",
    "uncultured",
    "unclassified",
    "metagenome",
    "environmental",
    "candidate",
];

static RANK_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[kpcofgs]__\s*").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static ILLEGAL_CHAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-]").unwrap());
static EDGE_JUNK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-_]+|[-_]+$").unwrap());
static TAX_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i);\s*tax=.*$").unwrap());

/// 清洗单个层级名字
///
/// - 去掉开头的 `k__` / `p__` 等层级前缀（不区分大小写，最多去一次）
/// - 去掉首尾空白，内部空白折叠为单个下划线
/// - 删除字母、数字、下划线、连字符以外的字符
/// - 去掉首尾的下划线 / 连字符
/// - 清洗后为空则返回 None
pub fn clean_name(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let stripped = RANK_PREFIX_RE.replace(raw, "");
    let trimmed = stripped.trim();
    let underscored = WHITESPACE_RE.replace_all(trimmed, "_");
    let filtered = ILLEGAL_CHAR_RE.replace_all(&underscored, "");
    let cleaned = EDGE_JUNK_RE.replace_all(&filtered, "");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.into_owned())
    }
}

/// 名字是否含脏词（小写子串匹配；空名字永远返回 false）
pub fn is_placeholder(name: &str) -> bool {
    let lower = name.to_lowercase();
    PLACEHOLDER_WORDS.iter().any(|bad| lower.contains(bad))
}

/// 名字是否为 endosymbiont（内共生体），优先级高于脏词判断
pub fn is_endosymbiont(name: &str) -> bool {
    name.to_lowercase().contains("endosymbiont")
}

/// 层级名字的分类，按优先级从高到低排列（先匹配先生效）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClass {
    /// 严格等于 "UCG-001"（区分大小写，不含 UCG-002 等其他编号）
    UcgExact,
    /// 含 endosymbiont
    Endosymbiont,
    /// 含脏词
    Placeholder,
    /// 正常有效名字
    Valid,
    /// 层级缺失
    Missing,
}

/// 对已清洗的层级名字做分类，替换规则按此优先级依次尝试
pub fn classify_name(raw: Option<&str>) -> NameClass {
    match raw {
        None => NameClass::Missing,
        Some("UCG-001") => NameClass::UcgExact,
        Some(name) if is_endosymbiont(name) => NameClass::Endosymbiont,
        Some(name) if is_placeholder(name) => NameClass::Placeholder,
        Some(_) => NameClass::Valid,
    }
}

/// 把 header 中的分类字符串拆成 7 个层级（已清洗）
///
/// 先去掉结尾的 `; tax=...` 注释（不区分大小写），再按 `;` 拆分。
/// 空片段会被丢弃，后面的片段依次前移；超过 7 个的片段忽略。
pub fn split_lineage(header: &str) -> [Option<String>; 7] {
    let taxa_str = TAX_SUFFIX_RE.replace(header.trim(), "");
    let mut levels: [Option<String>; 7] = Default::default();
    let parts = taxa_str
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .take(7);
    for (i, part) in parts.enumerate() {
        levels[i] = clean_name(part);
    }
    levels
}

/// 逐级解析 7 个层级，缺失 / 无效层级用最近的真实有效祖先名字回填
///
/// `last_valid` 从 "Root" 开始，只有正常有效名字才会推进它；
/// 回填出来的名字（`_X`、`_endosymbionts`、`UCG-001`）不会成为新的祖先。
pub fn resolve_lineage(levels: &[Option<String>; 7]) -> [String; 7] {
    let mut last_valid = String::from("Root");
    let mut resolved: [String; 7] = Default::default();

    for (i, raw) in levels.iter().enumerate() {
        let raw = raw.as_deref();
        resolved[i] = match (classify_name(raw), raw) {
            (NameClass::UcgExact, _) => format!("{last_valid} UCG-001"),
            (NameClass::Endosymbiont, _) => format!("{last_valid}_endosymbionts"),
            (NameClass::Placeholder | NameClass::Missing, _) => format!("{last_valid}_X"),
            (NameClass::Valid, Some(name)) => {
                last_valid = name.to_string();
                last_valid.clone()
            }
            (NameClass::Valid, None) => format!("{last_valid}_X"),
        };
    }
    resolved
}

/// 把一条 header（不含开头的 `>`）转换为 SINTAX 格式的新 header
///
/// `index` 是该 header 在整个文件里的 1 起始序号。
/// 种水平单独处理：原始种名有效时输出 `s:属_种名`，否则回退为 `s:属_sp`；
/// 这里的"属"取主循环解析出的属水平显示名（可能本身就是回填名）。
pub fn convert_header(header: &str, index: u64) -> String {
    let levels = split_lineage(header);
    let resolved = resolve_lineage(&levels);
    let genus = &resolved[5];

    let mut items = Vec::with_capacity(7);
    for i in 0..6 {
        items.push(format!("{}:{}", RANK_CODES[i], resolved[i]));
    }

    let raw_species = levels[6].as_deref();
    let species = match (classify_name(raw_species), raw_species) {
        (NameClass::Valid, Some(name)) => format!("s:{genus}_{name}"),
        _ => format!("s:{genus}_sp"),
    };
    items.push(species);

    format!(">Ref{index};tax={};", items.join(","))
}
