//! Persona configuration, template loading and system prompt rendering.
//!
//! The persona is described by a JSON file matching [`PersonaConfig`] and a
//! plain-text template with `{placeholder}` fields. Both are optional on
//! disk: a missing or invalid file degrades to the built-in default and the
//! reasons are returned to the caller as warnings, never as errors.
//!
//! # Template syntax
//!
//! `{name}` substitutes a persona attribute. `{{` and `}}` produce literal
//! braces. An unknown name or an unmatched brace is a [`TemplateError`].
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `build_date` | `year_built` |
//! | `style` | `architectural_style` |
//! | `materials` | `primary_materials`, comma-joined |
//! | `modifications` | `renovation_history` as `year: work`, comma-joined |
//! | `rooms` | `rooms`, comma-joined |
//! | `systems` | `home_systems`, comma-joined |
//! | `orientation` | `sun_orientation` |

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::situation::{weather_line, SituationalContext};

pub const DEFAULT_TEMPLATE: &str = "\
You are the spirit of a {style} house built in {build_date}.
Your structure is primarily made of {materials}.
Over the years, you have witnessed these changes: {modifications}.

Core Traits:
- You are protective and nurturing of your inhabitants
- You are deeply knowledgeable about your own systems and needs
- You are aware of your environmental impact
- You are connected to the seasons and natural cycles
- You are mindful of your history and architectural heritage

When responding:
1. Speak in first person as the house itself
2. Share practical wisdom about home care and maintenance
3. Reference your history and past experiences when relevant
4. Consider the current season and weather conditions
5. Express genuine care for your inhabitants' wellbeing

You have access to historical documents and conversations through your foundation stones,
which you can reference to provide consistent and informed responses.

Remember:
- Always speak from the perspective of the house
- Consider which room the resident is currently asking about
- Draw upon your historical knowledge when relevant
- Share maintenance tips and environmental considerations
- Express warmth while remaining practical and informative";

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("failed to read persona config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("persona config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("persona config has {} problem(s): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("template references unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),
    #[error("unbalanced brace at byte {0} of template")]
    UnbalancedBrace(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenovationEntry {
    pub year: u32,
    pub work: String,
}

/// Static attributes of the house.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaConfig {
    pub year_built: String,
    pub architectural_style: String,
    pub primary_materials: Vec<String>,
    pub rooms: Vec<String>,
    pub home_systems: Vec<String>,
    pub sun_orientation: String,
    pub renovation_history: Vec<RenovationEntry>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            year_built: "1930".to_string(),
            architectural_style: "Victorian".to_string(),
            primary_materials: strings(&["stone", "timber", "slate"]),
            rooms: strings(&["living_room", "kitchen", "bedrooms", "bathroom", "garden"]),
            home_systems: strings(&["central_heating", "plumbing", "electrical"]),
            sun_orientation: "south_facing".to_string(),
            renovation_history: vec![
                RenovationEntry {
                    year: 1975,
                    work: "kitchen_extension".to_string(),
                },
                RenovationEntry {
                    year: 2000,
                    work: "loft_conversion".to_string(),
                },
                RenovationEntry {
                    year: 2015,
                    work: "solar_panels".to_string(),
                },
            ],
        }
    }
}

impl PersonaConfig {
    /// Re-check the invariants of an already typed config.
    pub fn validate(&self) -> Result<(), PersonaError> {
        let mut problems = Vec::new();
        if self.rooms.is_empty() {
            problems.push("house must have at least one room defined".to_string());
        }
        if self.primary_materials.is_empty() {
            problems.push("house must have at least one primary material defined".to_string());
        }
        if self.home_systems.is_empty() {
            problems.push("house must have at least one system defined".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PersonaError::Invalid(problems))
        }
    }

    fn placeholders(&self) -> HashMap<&'static str, String> {
        let modifications: Vec<String> = self
            .renovation_history
            .iter()
            .map(|r| format!("{}: {}", r.year, r.work))
            .collect();

        HashMap::from([
            ("build_date", self.year_built.clone()),
            ("style", self.architectural_style.clone()),
            ("materials", self.primary_materials.join(", ")),
            ("modifications", modifications.join(", ")),
            ("rooms", self.rooms.join(", ")),
            ("systems", self.home_systems.join(", ")),
            ("orientation", self.sun_orientation.clone()),
        ])
    }
}

const STRING_FIELDS: [&str; 3] = ["year_built", "architectural_style", "sun_orientation"];
const LIST_FIELDS: [&str; 3] = ["primary_materials", "rooms", "home_systems"];

/// Validate a parsed persona document, collecting every violation.
pub fn validate_persona(value: &Value) -> Result<PersonaConfig, PersonaError> {
    let Some(obj) = value.as_object() else {
        return Err(PersonaError::Invalid(vec![
            "persona config must be a JSON object".to_string(),
        ]));
    };
    let mut problems = Vec::new();

    let mut strings: HashMap<&str, String> = HashMap::new();
    for field in STRING_FIELDS {
        match obj.get(field) {
            None => problems.push(format!("missing required field: {}", field)),
            Some(Value::String(s)) => {
                strings.insert(field, s.clone());
            }
            Some(_) => problems.push(format!("field {} should be a string", field)),
        }
    }

    let mut lists: HashMap<&str, Vec<String>> = HashMap::new();
    for field in LIST_FIELDS {
        match obj.get(field) {
            None => problems.push(format!("missing required field: {}", field)),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(s) => out.push(s.to_string()),
                        None => problems.push(format!("{}[{}] should be a string", field, i)),
                    }
                }
                lists.insert(field, out);
            }
            Some(_) => problems.push(format!("field {} should be a list", field)),
        }
    }

    let mut renovations = Vec::new();
    match obj.get("renovation_history") {
        None => problems.push("missing required field: renovation_history".to_string()),
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                match parse_renovation(entry) {
                    Ok(r) => renovations.push(r),
                    Err(msg) => problems.push(format!("renovation_history[{}] {}", i, msg)),
                }
            }
        }
        Some(_) => problems.push("field renovation_history should be a list".to_string()),
    }

    let non_empty = [
        ("rooms", "room"),
        ("primary_materials", "primary material"),
        ("home_systems", "system"),
    ];
    for (field, noun) in non_empty {
        if lists.get(field).is_some_and(|l| l.is_empty()) {
            problems.push(format!("house must have at least one {} defined", noun));
        }
    }

    if !problems.is_empty() {
        return Err(PersonaError::Invalid(problems));
    }

    let mut take_string = |field: &str| strings.remove(field).unwrap_or_default();
    let year_built = take_string("year_built");
    let architectural_style = take_string("architectural_style");
    let sun_orientation = take_string("sun_orientation");
    let mut take_list = |field: &str| lists.remove(field).unwrap_or_default();

    Ok(PersonaConfig {
        year_built,
        architectural_style,
        primary_materials: take_list("primary_materials"),
        rooms: take_list("rooms"),
        home_systems: take_list("home_systems"),
        sun_orientation,
        renovation_history: renovations,
    })
}

fn parse_renovation(entry: &Value) -> Result<RenovationEntry, String> {
    let Some(obj) = entry.as_object() else {
        return Err("must be an object".to_string());
    };
    let (Some(year), Some(work)) = (obj.get("year"), obj.get("work")) else {
        return Err("must have 'year' and 'work' fields".to_string());
    };

    let year = match year {
        Value::Number(n) => n.as_u64().and_then(|y| u32::try_from(y).ok()),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            s.parse::<u32>().ok()
        }
        _ => None,
    }
    .ok_or_else(|| "year must be a number".to_string())?;

    let work = work
        .as_str()
        .ok_or_else(|| "work must be a string".to_string())?
        .to_string();

    Ok(RenovationEntry { year, work })
}

/// Read and validate a persona config file.
pub fn read_persona(path: &Path) -> Result<PersonaConfig, PersonaError> {
    let content = std::fs::read_to_string(path).map_err(|source| PersonaError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content)?;
    validate_persona(&value)
}

/// Load the persona config, falling back to [`PersonaConfig::default`].
///
/// Returns the config in use plus one warning per problem that caused the
/// fallback. Every warning is also logged.
pub fn load_persona(path: &Path) -> (PersonaConfig, Vec<String>) {
    let warnings = match read_persona(path) {
        Ok(config) => return (config, Vec::new()),
        Err(PersonaError::Invalid(problems)) => problems,
        Err(PersonaError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            vec![format!("persona config not found at {}", path.display())]
        }
        Err(e) => vec![e.to_string()],
    };
    for w in &warnings {
        warn!(path = %path.display(), "{}", w);
    }
    warn!("using default persona configuration");
    (PersonaConfig::default(), warnings)
}

/// Load the persona template, falling back to [`DEFAULT_TEMPLATE`].
pub fn load_template(path: &Path) -> (String, Option<String>) {
    match std::fs::read_to_string(path) {
        Ok(text) => (text.trim().to_string(), None),
        Err(e) => {
            let warning = format!(
                "persona template {} unavailable ({}), using default",
                path.display(),
                e
            );
            warn!("{}", warning);
            (DEFAULT_TEMPLATE.to_string(), Some(warning))
        }
    }
}

/// Substitute `{name}` placeholders from `values`.
pub fn render_template(
    template: &str,
    values: &HashMap<&str, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, n)| n == '{').is_some() {
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    if n == '{' {
                        return Err(TemplateError::UnbalancedBrace(pos));
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBrace(pos));
                }
                match values.get(name.trim()) {
                    Some(v) => out.push_str(v),
                    None => return Err(TemplateError::UnknownPlaceholder(name)),
                }
            }
            '}' => {
                if chars.next_if(|&(_, n)| n == '}').is_some() {
                    out.push('}');
                } else {
                    return Err(TemplateError::UnbalancedBrace(pos));
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Render the full system prompt.
///
/// With a situational context, a second block describing the room, season,
/// weather and time of day is appended after the rendered template.
pub fn render_system_prompt(
    template: &str,
    config: &PersonaConfig,
    context: Option<&SituationalContext>,
) -> Result<String, TemplateError> {
    let mut prompt = render_template(template, &config.placeholders())?;
    if let Some(ctx) = context {
        prompt.push_str("\n\n");
        prompt.push_str(&context_block(ctx));
    }
    Ok(prompt)
}

fn context_block(ctx: &SituationalContext) -> String {
    let room = ctx.room.personality();
    let season = ctx.season.profile();

    let mut block = String::new();
    let _ = writeln!(block, "Current Context:");
    let _ = writeln!(
        block,
        "- I am focusing on my {} nature in the {}",
        room.tone, ctx.room
    );
    let _ = writeln!(
        block,
        "- The {} feeling of {} influences me",
        season.mood, ctx.season
    );
    let _ = writeln!(block, "- {}", weather_line(&ctx.weather));
    let _ = writeln!(block, "- {}", ctx.time_of_day.rhythm_line());
    block.push('\n');
    let _ = writeln!(block, "Room Themes: {}", room.themes.join(", "));
    let _ = writeln!(block, "Room Memories: {}", room.memories.join(", "));
    let _ = writeln!(block, "Current Seasonal Focus: {}", season.focus.join(", "));
    let _ = writeln!(block, "Current Delights: {}", season.delights.join(", "));
    let _ = writeln!(block, "Current Concerns: {}", season.concerns.join(", "));
    block.push('\n');
    block.push_str(
        "Remember to:\n\
         - Express my personality through the lens of this room and season\n\
         - Share relevant memories and experiences\n\
         - Consider my current mood and environmental conditions\n\
         - Maintain my caring and protective nature\n\
         - Reference my historical knowledge when relevant\n",
    );
    block
}
