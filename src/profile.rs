//! Industry profiles.
//!
//! A profile bundles the system prompts, prompt templates and analyzer
//! keywords for one research domain. Three profiles are compiled in;
//! each can be overridden by a `<id>.json` file in the profile directory.
//!
//! Templates use `{name}` placeholders filled by
//! [`render_template`](crate::research::prompt::render_template):
//! `{industry_name}`, `{query}`, `{max_subqueries}`, `{evidence}` and
//! `{analysis}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Default profile directory under the user's home.
const DEFAULT_PROFILE_DIR: &str = ".config/delve-rs/profiles";
/// Profile used when a caller does not name one.
pub const DEFAULT_PROFILE_ID: &str = "deepResearch";
/// Sub-queries a planner aims for when a profile does not say.
const DEFAULT_TARGET_SUBQUERIES: usize = 5;

/// One research domain's prompts and analyzer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryProfile {
    /// Stable identifier used by callers (e.g. `"finance"`).
    pub id: String,
    /// Human-readable name, substituted for `{industry_name}`.
    pub name: String,
    /// Prefix for saved report file names.
    pub filename_prefix: String,
    /// System prompt for planning and reflection calls.
    pub assistant_prompt: String,
    /// System prompt for the report call.
    pub synthesizer_prompt: String,
    /// Template for the decomposition request.
    pub plan_template: String,
    /// Template for the sufficiency check.
    pub reflection_template: String,
    /// Template for the report request.
    pub synthesis_template: String,
    /// Keywords counted by the data scan.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// How many sub-queries the planner should produce.
    #[serde(default = "default_target_subqueries")]
    pub target_subqueries: usize,
}

const fn default_target_subqueries() -> usize {
    DEFAULT_TARGET_SUBQUERIES
}

/// Short description of a profile for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    /// Profile identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

/// The set of profiles available to a research engine.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Arc<IndustryProfile>>,
}

impl ProfileRegistry {
    /// Returns the compiled-in profiles without checking the filesystem.
    #[must_use]
    pub fn builtin() -> Self {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|p| (p.id.clone(), Arc::new(p)))
            .collect();
        Self { profiles }
    }

    /// Loads profiles, letting files in the profile directory override
    /// or extend the compiled-in set.
    ///
    /// Resolution order for the directory:
    /// 1. Explicit `dir` argument
    /// 2. `DELVE_PROFILE_DIR` environment variable
    /// 3. `~/.config/delve-rs/profiles/`
    ///
    /// A missing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProfileLoad`] if a `.json` file in the
    /// directory cannot be read or parsed.
    pub fn load(dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin();

        let resolved = dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("DELVE_PROFILE_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let Some(dir) = resolved else {
            return Ok(registry);
        };
        let Ok(entries) = std::fs::read_dir(&dir) else {
            debug!(dir = %dir.display(), "profile directory not found, using built-in profiles");
            return Ok(registry);
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let profile = read_profile(&path)?;
            debug!(id = %profile.id, path = %path.display(), "loaded profile");
            registry.insert(profile);
        }

        Ok(registry)
    }

    /// Adds or replaces a profile.
    pub fn insert(&mut self, profile: IndustryProfile) {
        if self.profiles.contains_key(&profile.id) {
            debug!(id = %profile.id, "overriding profile");
        }
        self.profiles.insert(profile.id.clone(), Arc::new(profile));
    }

    /// Looks up a profile by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<IndustryProfile>> {
        self.profiles.get(id).cloned()
    }

    /// Profile ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Id and name of every profile.
    #[must_use]
    pub fn summaries(&self) -> Vec<ProfileSummary> {
        self.profiles
            .values()
            .map(|p| ProfileSummary {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect()
    }

    /// Number of profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Writes the compiled-in profiles to `dir` as JSON.
    ///
    /// Creates the directory if needed. Existing files are **not**
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProfileWrite`] if the directory or a file
    /// cannot be written.
    pub fn write_defaults(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::ProfileWrite {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::new();
        for profile in builtin_profiles() {
            let path = dir.join(format!("{}.json", profile.id));
            if path.exists() {
                continue;
            }
            let json = serde_json::to_string_pretty(&profile).map_err(|e| {
                ConfigError::ProfileWrite {
                    path: path.clone(),
                    source: std::io::Error::other(e),
                }
            })?;
            std::fs::write(&path, json).map_err(|source| ConfigError::ProfileWrite {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }

        Ok(written)
    }

    /// Returns the default profile directory under the user's home.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROFILE_DIR))
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn read_profile(path: &Path) -> Result<IndustryProfile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ProfileLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut profile: IndustryProfile =
        serde_json::from_str(&raw).map_err(|e| ConfigError::ProfileLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if profile.id.trim().is_empty() {
        return Err(ConfigError::ProfileLoad {
            path: path.to_path_buf(),
            message: "profile id is empty".to_string(),
        });
    }
    if profile.target_subqueries == 0 {
        warn!(id = %profile.id, "target_subqueries is 0, using default");
        profile.target_subqueries = DEFAULT_TARGET_SUBQUERIES;
    }
    Ok(profile)
}

const PLAN_FORMAT: &str = r#"请严格按照以下 JSON 格式输出，不要包含任何额外的解释或评论，子问题数量不超过 {max_subqueries} 个：
{
  "subqueries": ["子问题1", "子问题2"]
}

用户主要问题："{query}""#;

const REFLECTION_TEMPLATE: &str = r#"作为【{industry_name}】分析评估员，请评估为回答以下用户原始问题而收集的信息。

用户原始问题："{query}"

目前收集到的信息（每条以 [编号] 开头，可能部分截断）：
{evidence}

请评估：
1. `can_answer`：这些信息是否足够全面地回答用户的原始问题？(true/false)
2. `rationale`：一句话说明判断理由。
3. `irrelevant_urls`：与原始问题明显无关或价值很低的条目的来源 URL 列表，没有则为 []。
4. `new_subqueries`：还需要搜索哪些具体的、新的子问题来补齐关键信息？最多 {max_subqueries} 个，信息已足够则为 []。

请严格按照以下 JSON 格式响应，不要包含任何额外的解释或评论：
{
  "can_answer": false,
  "rationale": "判断理由",
  "irrelevant_urls": [],
  "new_subqueries": ["新问题1"]
}"#;

const SYNTHESIS_RULES: &str = r"请严格遵守以下要求撰写报告：
1. 完全基于上面提供的信息撰写，不得添加外部知识、个人观点或信息中未出现的精确数据。
2. 清晰、有条理地组织内容，直接回答用户的原始问题，可使用标题和小标题。
3. 必须引用来源：使用某条信息时，在句末用方括号注明该条信息的编号，例如 [3]；引用多条时写作 [2][5]。只能使用上面出现过的编号。
4. 如果提供了数据扫描摘要，可以把其中的关键词频率、数值或百分比融入报告，并说明这只是对所给文本的初步扫描，不是精确的实时数据。
5. 语言专业、客观、中立，避免过度乐观或悲观的措辞。
6. 信息之间存在矛盾时，请客观指出。
7. 信息不足以回答问题的某些方面时，请明确说明。
8. 结尾可做简要总结或展望，但必须基于已提供的信息。";

fn synthesis_template(audience: &str, sections: &str) -> String {
    format!(
        "您是一位专业的【{{industry_name}}】分析师。请基于以下通过网络搜索收集到的信息，为用户生成一份全面、结构清晰、客观中立的{audience}，回答他们的原始问题。\n\n\
         用户的原始问题是：\"{{query}}\"\n\n\
         以下是收集到的相关信息（每条以 [编号] 开头）：\n\
         --- 开始信息 ---\n{{evidence}}\n--- 结束信息 ---\n\
         {{analysis}}\n\
         {SYNTHESIS_RULES}\n\
         {sections}\n\n\
         请开始撰写报告："
    )
}

fn builtin_profiles() -> Vec<IndustryProfile> {
    vec![
        IndustryProfile {
            id: "deepResearch".to_string(),
            name: "深度研究".to_string(),
            filename_prefix: "deepResearch_".to_string(),
            assistant_prompt: "你是一位资深分析师。请仔细遵循指示并以要求的格式回答。".to_string(),
            synthesizer_prompt:
                "你是一位资深分析师，负责根据收集的信息生成客观的研究报告。请严格遵循指示，并用 [编号] 引用来源。"
                    .to_string(),
            plan_template: format!(
                "你是一个问题拆解专家。请把用户的主要问题拆解为具体的、可以直接搜索的子问题，以全面研究该主题。\n\
                 拆解时横向遵循 MECE 原则（相互独立、完全穷尽），纵向逐层追问原因，并覆盖时间、地域、主体、影响因素和量化指标等边界。\n\n\
                 {PLAN_FORMAT}"
            ),
            reflection_template: REFLECTION_TEMPLATE.to_string(),
            synthesis_template: synthesis_template("研究报告", ""),
            keywords: Vec::new(),
            target_subqueries: DEFAULT_TARGET_SUBQUERIES,
        },
        IndustryProfile {
            id: "finance".to_string(),
            name: "金融市场 (Financial Markets)".to_string(),
            filename_prefix: "金融市场分析_".to_string(),
            assistant_prompt:
                "你是一位专门研究金融市场行情的资深分析助理。请仔细遵循指示并以要求的格式回答。"
                    .to_string(),
            synthesizer_prompt:
                "你是一位专业的金融市场分析师，负责根据收集的信息生成客观的市场分析报告。请严格遵循指示，并用 [编号] 引用来源。"
                    .to_string(),
            plan_template: format!(
                "请将以下用户关于【{{industry_name}}】的主要问题分解为具体的、可搜索的子问题，以全面分析该主题。\n\
                 请关注市场概览、关键指标与指数表现、重要板块与公司动态、相关新闻事件、宏观经济与政策影响等方面。\n\n\
                 {PLAN_FORMAT}"
            ),
            reflection_template: REFLECTION_TEMPLATE.to_string(),
            synthesis_template: synthesis_template(
                "市场分析报告",
                "可参考的结构：市场概览、主要趋势、关键参与者、重要新闻、总结与展望。避免给出直接的投资建议。",
            ),
            keywords: to_strings(&[
                "股票", "A股", "港股", "美股", "上证指数", "深证成指", "创业板指", "恒生指数",
                "纳斯达克", "道琼斯", "上涨", "下跌", "涨幅", "跌幅", "成交额", "成交量", "换手率",
                "市盈率", "市净率", "板块", "龙头", "宏观经济", "利率", "通胀", "加息", "降息",
                "财报", "业绩", "利好", "利空", "风险", "预期", "IPO", "并购", "央行",
            ]),
            target_subqueries: DEFAULT_TARGET_SUBQUERIES,
        },
        IndustryProfile {
            id: "tech".to_string(),
            name: "科技行业 (Technology Industry)".to_string(),
            filename_prefix: "科技行业分析_".to_string(),
            assistant_prompt:
                "你是一位专门研究科技行业动态的资深分析助理。请仔细遵循指示并以要求的格式回答。"
                    .to_string(),
            synthesizer_prompt:
                "你是一位专业的科技行业分析师，负责根据收集的信息生成客观的行业分析报告。请严格遵循指示，并用 [编号] 引用来源。"
                    .to_string(),
            plan_template: format!(
                "请将以下用户关于【{{industry_name}}】的主要问题分解为具体的、可搜索的子问题，以全面分析该主题。\n\
                 请关注市场规模与增长、关键技术领域、主要公司动态（产品、战略、财报）、投融资活动、最新行业新闻、政策法规影响等方面。\n\n\
                 {PLAN_FORMAT}"
            ),
            reflection_template: REFLECTION_TEMPLATE.to_string(),
            synthesis_template: synthesis_template(
                "行业分析报告",
                "可参考的结构：行业概览、技术趋势、主要公司动态、投融资情况、总结与展望。避免给出直接的商业建议。",
            ),
            keywords: to_strings(&[
                "人工智能", "AI", "机器学习", "芯片", "半导体", "云计算", "大数据", "软件", "硬件",
                "互联网", "SaaS", "物联网", "5G", "6G", "VR", "AR", "初创公司", "融资", "风险投资",
                "上市", "IPO", "裁员", "并购", "科技巨头", "创新", "研发", "专利", "监管",
                "数据隐私", "网络安全",
            ]),
            target_subqueries: DEFAULT_TARGET_SUBQUERIES,
        },
    ]
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_string()).collect()
}
