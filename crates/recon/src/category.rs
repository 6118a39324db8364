use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Display name used for category codes the classifier does not define.
pub const UNKNOWN_CATEGORY_NAME: &str = "Невідомий тип";

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Region kinds are areas (matched against OSM relations/ways), point kinds are
/// settlements (matched against OSM nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Region,
    Point,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Region => write!(f, "region"),
            Self::Point => write!(f, "point"),
        }
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Oblast,
    District,
    Community,
    CityDistrict,
    City,
    Town,
    Village,
    RuralSettlement,
    /// A code the classifier does not define, kept verbatim so the
    /// collection round-trips.
    Unknown(String),
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Oblast,
        Category::District,
        Category::Community,
        Category::CityDistrict,
        Category::City,
        Category::Town,
        Category::Village,
        Category::RuralSettlement,
    ];

    /// Parse a classifier category letter. The classifier mixes Latin and
    /// Cyrillic look-alikes, so both are accepted.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "O" | "О" => Some(Self::Oblast),
            "P" | "Р" => Some(Self::District),
            "H" | "Н" => Some(Self::Community),
            "B" | "В" => Some(Self::CityDistrict),
            "K" | "К" => Some(Self::City),
            "M" | "М" => Some(Self::Town),
            "X" | "Х" | "Щ" | "T" | "Т" => Some(Self::Village),
            "C" | "С" => Some(Self::RuralSettlement),
            _ => None,
        }
    }

    /// Canonical (Latin) category letter, as written to the collection.
    pub fn code(&self) -> &str {
        match self {
            Self::Oblast => "O",
            Self::District => "P",
            Self::Community => "H",
            Self::CityDistrict => "B",
            Self::City => "K",
            Self::Town => "M",
            Self::Village => "X",
            Self::RuralSettlement => "C",
            Self::Unknown(code) => code,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Oblast => "область",
            Self::District => "район",
            Self::Community => "громада",
            Self::CityDistrict => "район міста",
            Self::City | Self::Town => "місто",
            Self::Village => "селище",
            Self::RuralSettlement => "село",
            Self::Unknown(_) => UNKNOWN_CATEGORY_NAME,
        }
    }

    /// Administrative depth. Cities of special status (Kyiv, Sevastopol) sit
    /// at the oblast level.
    pub fn admin_level(&self) -> u8 {
        match self {
            Self::Oblast | Self::City => 1,
            Self::District => 2,
            Self::Community => 3,
            Self::Town | Self::Village | Self::RuralSettlement => 4,
            Self::CityDistrict => 5,
            Self::Unknown(_) => 0,
        }
    }

    /// Unknown categories are treated as settlements.
    pub fn kind(&self) -> Kind {
        match self {
            Self::Oblast | Self::District | Self::Community | Self::CityDistrict => Kind::Region,
            Self::City | Self::Town | Self::Village | Self::RuralSettlement | Self::Unknown(_) => Kind::Point,
        }
    }

    pub fn is_region(&self) -> bool {
        self.kind() == Kind::Region
    }

    pub fn is_point(&self) -> bool {
        self.kind() == Kind::Point
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Category::from_code(&raw).unwrap_or_else(|| Category::Unknown(raw)))
    }
}

// ---------------------------------------------------------------------------
// Lookups over raw codes
// ---------------------------------------------------------------------------

/// Display name for a raw category code; unknown codes degrade gracefully.
pub fn category_name(code: &str) -> &'static str {
    Category::from_code(code)
        .map(|c| c.display_name())
        .unwrap_or(UNKNOWN_CATEGORY_NAME)
}

/// Administrative level for a raw category code, 0 when unknown.
pub fn admin_level(code: &str) -> u8 {
    Category::from_code(code).map(|c| c.admin_level()).unwrap_or(0)
}

pub fn kind_of(code: &str) -> Option<Kind> {
    Category::from_code(code).map(|c| c.kind())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_classifier() {
        assert_eq!(admin_level("O"), 1);
        assert_eq!(admin_level("P"), 2);
        assert_eq!(admin_level("H"), 3);
        assert_eq!(admin_level("M"), 4);
        assert_eq!(admin_level("B"), 5);
        assert_eq!(admin_level("K"), 1);
    }

    #[test]
    fn unknown_code_degrades() {
        assert_eq!(category_name("Z"), UNKNOWN_CATEGORY_NAME);
        assert_eq!(admin_level("Z"), 0);
        assert_eq!(admin_level(""), 0);
        assert!(kind_of("Z").is_none());
    }

    #[test]
    fn cyrillic_letters_map_to_latin() {
        assert_eq!(Category::from_code("С"), Some(Category::RuralSettlement));
        assert_eq!(Category::from_code("Р"), Some(Category::District));
        assert_eq!(Category::from_code("Т"), Some(Category::Village));
        assert_eq!(Category::from_code("К").unwrap().code(), "K");
    }

    #[test]
    fn region_and_point_partition() {
        let regions: Vec<_> = Category::ALL.iter().filter(|c| c.is_region()).collect();
        let points: Vec<_> = Category::ALL.iter().filter(|c| c.is_point()).collect();
        assert_eq!(regions.len(), 4);
        assert_eq!(points.len(), 4);
        assert_eq!(Category::CityDistrict.kind(), Kind::Region);
        assert_eq!(Category::City.kind(), Kind::Point);
    }

    #[test]
    fn serde_uses_latin_code() {
        let json = serde_json::to_string(&Category::Community).unwrap();
        assert_eq!(json, "\"H\"");
        let back: Category = serde_json::from_str("\"Н\"").unwrap();
        assert_eq!(back, Category::Community);
    }

    #[test]
    fn unknown_code_is_kept_verbatim() {
        let unknown: Category = serde_json::from_str("\"Ю\"").unwrap();
        assert_eq!(unknown, Category::Unknown("Ю".into()));
        assert_eq!(unknown.display_name(), UNKNOWN_CATEGORY_NAME);
        assert_eq!(unknown.admin_level(), 0);
        assert_eq!(unknown.kind(), Kind::Point);
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "\"Ю\"");
    }
}
