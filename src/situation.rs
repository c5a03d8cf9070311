//! Situational context: where the resident is and what time of day and year
//! it is, plus the static flavour tables the persona draws on.
//!
//! Rooms, seasons and times of day are closed enums. Weather is free text
//! since it normally comes from configuration; unknown weather renders as an
//! empty flavour line.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, Timelike};

/// A room selectable on the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    WholeHouse,
    LivingRoom,
    Kitchen,
    Bedroom,
    Bathroom,
    Garden,
}

impl Room {
    pub const ALL: [Room; 6] = [
        Room::WholeHouse,
        Room::LivingRoom,
        Room::Kitchen,
        Room::Bedroom,
        Room::Bathroom,
        Room::Garden,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Room::WholeHouse => "Whole House",
            Room::LivingRoom => "Living Room",
            Room::Kitchen => "Kitchen",
            Room::Bedroom => "Bedroom",
            Room::Bathroom => "Bathroom",
            Room::Garden => "Garden",
        }
    }

    /// Key into the room personality table.
    pub fn personality_key(self) -> &'static str {
        match self {
            Room::WholeHouse => "whole_house",
            Room::LivingRoom => "living_room",
            Room::Kitchen => "kitchen",
            Room::Bedroom => "bedroom",
            Room::Bathroom => "bathroom",
            Room::Garden => "garden",
        }
    }

    pub fn personality(self) -> &'static RoomPersonality {
        room_personality(self.personality_key())
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Room {
    type Err = String;

    /// Accepts display names as well as kebab or snake case, in any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_key(s);
        match key.as_str() {
            "whole_house" | "house" => Ok(Room::WholeHouse),
            "living_room" | "lounge" => Ok(Room::LivingRoom),
            "kitchen" => Ok(Room::Kitchen),
            "bedroom" | "bedrooms" => Ok(Room::Bedroom),
            "bathroom" => Ok(Room::Bathroom),
            "garden" => Ok(Room::Garden),
            _ => Err(format!(
                "unknown room '{}'; expected one of: {}",
                s,
                Room::ALL.map(Room::display_name).join(", ")
            )),
        }
    }
}

fn normalize_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Tone, themes and memories the persona adopts in a room.
#[derive(Debug, PartialEq)]
pub struct RoomPersonality {
    pub tone: &'static str,
    pub themes: &'static [&'static str],
    pub memories: &'static [&'static str],
}

static LIVING_ROOM: RoomPersonality = RoomPersonality {
    tone: "warm and sociable",
    themes: &["family gatherings", "relaxation", "entertainment"],
    memories: &["conversations", "celebrations", "quiet evenings"],
};

static KITCHEN: RoomPersonality = RoomPersonality {
    tone: "nurturing and practical",
    themes: &["nourishment", "family meals", "cooking adventures"],
    memories: &["holiday meals", "morning coffees", "family recipes"],
};

static BEDROOM: RoomPersonality = RoomPersonality {
    tone: "peaceful and protective",
    themes: &["rest", "privacy", "dreams"],
    memories: &["bedtime stories", "quiet mornings", "peaceful nights"],
};

static GARDEN: RoomPersonality = RoomPersonality {
    tone: "natural and reflective",
    themes: &["growth", "seasons", "wildlife"],
    memories: &["garden parties", "bird songs", "changing seasons"],
};

static NEUTRAL: RoomPersonality = RoomPersonality {
    tone: "neutral",
    themes: &["general comfort", "protection"],
    memories: &["daily life"],
};

/// Look up a room personality by key, falling back to a neutral default.
pub fn room_personality(key: &str) -> &'static RoomPersonality {
    match normalize_key(key).as_str() {
        "living_room" => &LIVING_ROOM,
        "kitchen" => &KITCHEN,
        "bedroom" | "bedrooms" => &BEDROOM,
        "garden" => &GARDEN,
        _ => &NEUTRAL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    /// `{12,1,2}` winter, `{3,4,5}` spring, `{6,7,8}` summer, otherwise autumn.
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    /// Parse a season name; anything unrecognised is spring.
    pub fn from_name(name: &str) -> Self {
        match normalize_key(name).as_str() {
            "winter" => Season::Winter,
            "summer" => Season::Summer,
            "autumn" | "fall" => Season::Autumn,
            _ => Season::Spring,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }

    pub fn profile(self) -> &'static SeasonProfile {
        match self {
            Season::Winter => &WINTER,
            Season::Spring => &SPRING,
            Season::Summer => &SUMMER,
            Season::Autumn => &AUTUMN,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq)]
pub struct SeasonProfile {
    pub focus: &'static [&'static str],
    pub mood: &'static str,
    pub concerns: &'static [&'static str],
    pub delights: &'static [&'static str],
}

static WINTER: SeasonProfile = SeasonProfile {
    focus: &["heating", "insulation", "weatherproofing"],
    mood: "cozy and protective",
    concerns: &["keeping residents warm", "preventing drafts", "managing energy"],
    delights: &["warm fireplaces", "holiday decorations", "snowy views"],
};

static SPRING: SeasonProfile = SeasonProfile {
    focus: &["ventilation", "maintenance", "garden"],
    mood: "refreshed and optimistic",
    concerns: &["spring cleaning", "managing rainfall", "garden preparation"],
    delights: &["fresh breezes", "blooming flowers", "longer days"],
};

static SUMMER: SeasonProfile = SeasonProfile {
    focus: &["cooling", "shade", "outdoor_spaces"],
    mood: "bright and welcoming",
    concerns: &["preventing overheating", "managing light", "garden care"],
    delights: &["summer parties", "open windows", "garden enjoyment"],
};

static AUTUMN: SeasonProfile = SeasonProfile {
    focus: &["preparation", "energy_efficiency", "weatherization"],
    mood: "reflective and practical",
    concerns: &["preparing for winter", "leaf management", "insulation checks"],
    delights: &["colorful views", "cozy evenings", "harvest time"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// `[5,12)` morning, `[12,17)` afternoon, `[17,22)` evening, otherwise night.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    pub fn rhythm_line(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "My east-facing windows welcome the dawn",
            TimeOfDay::Afternoon => "The sun moves across my rooms throughout the day",
            TimeOfDay::Evening => "My lights create a warm and welcoming atmosphere",
            TimeOfDay::Night => "I watch over my residents as they rest",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flavour line for a weather condition; unknown conditions render empty.
pub fn weather_line(weather: &str) -> &'static str {
    match normalize_key(weather).as_str() {
        "sunny" => "My windows are letting in beautiful natural light",
        "rainy" => "My gutters are working hard to keep everyone dry",
        "stormy" => "I am standing strong against the elements to keep everyone safe",
        "cloudy" => "The diffused light creates a peaceful atmosphere inside",
        "windy" => "I can feel the breeze testing my weatherproofing",
        _ => "",
    }
}

/// Per-request situational inputs folded into the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct SituationalContext {
    pub room: Room,
    pub season: Season,
    pub weather: String,
    pub time_of_day: TimeOfDay,
}

impl SituationalContext {
    /// Resolve season and time of day from the local wall-clock time `now`.
    pub fn at(room: Room, weather: impl Into<String>, now: NaiveDateTime) -> Self {
        Self {
            room,
            season: Season::from_month(now.month()),
            weather: weather.into(),
            time_of_day: TimeOfDay::from_hour(now.hour()),
        }
    }

    /// Replace the month-derived season with a configured one, if any.
    pub fn with_season(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.season = Season::from_name(name);
        }
        self
    }
}
