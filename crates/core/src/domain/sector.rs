use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of sector codes. `Other` is the explicit fallback for anything unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Semiconductor,
    Ai,
    Energy,
    Battery,
    Bio,
    Defense,
    Auto,
    Robot,
    Media,
    Shipbuilding,
    Finance,
    Software,
    Telecom,
    Consumer,
    Materials,
    Construction,
    Quantum,
    Cybersecurity,
    Blockchain,
    Other,
}

impl Sector {
    pub const ALL: [Sector; 20] = [
        Sector::Semiconductor,
        Sector::Ai,
        Sector::Energy,
        Sector::Battery,
        Sector::Bio,
        Sector::Defense,
        Sector::Auto,
        Sector::Robot,
        Sector::Media,
        Sector::Shipbuilding,
        Sector::Finance,
        Sector::Software,
        Sector::Telecom,
        Sector::Consumer,
        Sector::Materials,
        Sector::Construction,
        Sector::Quantum,
        Sector::Cybersecurity,
        Sector::Blockchain,
        Sector::Other,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::Semiconductor => "semiconductor",
            Self::Ai => "ai",
            Self::Energy => "energy",
            Self::Battery => "battery",
            Self::Bio => "bio",
            Self::Defense => "defense",
            Self::Auto => "auto",
            Self::Robot => "robot",
            Self::Media => "media",
            Self::Shipbuilding => "shipbuilding",
            Self::Finance => "finance",
            Self::Software => "software",
            Self::Telecom => "telecom",
            Self::Consumer => "consumer",
            Self::Materials => "materials",
            Self::Construction => "construction",
            Self::Quantum => "quantum",
            Self::Cybersecurity => "cybersecurity",
            Self::Blockchain => "blockchain",
            Self::Other => "other",
        }
    }

    /// Maps a producer-supplied label (code, Korean sector name or GICS sector) onto the closed
    /// set. Unknown labels fall back to `Other`.
    pub fn normalize(label: &str) -> Sector {
        let label = label.trim();
        if let Ok(sector) = label.parse::<Sector>() {
            return sector;
        }
        SECTOR_ALIASES
            .iter()
            .find(|(alias, _)| *alias == label)
            .map(|(_, sector)| *sector)
            .unwrap_or(Sector::Other)
    }
}

// Korean labels and GICS sector names seen in classifier output.
const SECTOR_ALIASES: &[(&str, Sector)] = &[
    ("반도체", Sector::Semiconductor),
    ("정보기술", Sector::Software),
    ("소프트웨어", Sector::Software),
    ("에너지", Sector::Energy),
    ("배터리", Sector::Battery),
    ("바이오", Sector::Bio),
    ("헬스케어", Sector::Bio),
    ("방산", Sector::Defense),
    ("방위", Sector::Defense),
    ("자동차", Sector::Auto),
    ("운송", Sector::Auto),
    ("로봇", Sector::Robot),
    ("미디어", Sector::Media),
    ("조선", Sector::Shipbuilding),
    ("금융", Sector::Finance),
    ("통신", Sector::Telecom),
    ("소비재", Sector::Consumer),
    ("유통", Sector::Consumer),
    ("소재", Sector::Materials),
    ("화학", Sector::Materials),
    ("자재", Sector::Materials),
    ("건설", Sector::Construction),
    ("양자", Sector::Quantum),
    ("보안", Sector::Cybersecurity),
    ("블록체인", Sector::Blockchain),
    ("암호화폐", Sector::Blockchain),
    ("유틸리티", Sector::Energy),
    ("기타", Sector::Other),
    ("자산운용", Sector::Finance),
    ("보험", Sector::Finance),
    ("부동산", Sector::Construction),
    ("기업인수합병", Sector::Finance),
    ("산업", Sector::Materials),
    ("전력", Sector::Energy),
    ("항공", Sector::Defense),
    ("우주", Sector::Defense),
    ("게임", Sector::Media),
    ("엔터", Sector::Media),
    ("제약", Sector::Bio),
    ("의료", Sector::Bio),
    ("Communication Services", Sector::Media),
    ("Industrials", Sector::Materials),
    ("Consumer Discretionary", Sector::Consumer),
    ("Consumer Staples", Sector::Consumer),
    ("Health Care", Sector::Bio),
    ("Information Technology", Sector::Software),
    ("Real Estate", Sector::Construction),
    ("Utilities", Sector::Energy),
    ("Financials", Sector::Finance),
    ("Materials", Sector::Materials),
    ("Energy", Sector::Energy),
];

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Sector {
    type Err = String;

    /// Strict: only the exact lowercase codes are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sector::ALL
            .iter()
            .copied()
            .find(|sector| sector.code() == s)
            .ok_or_else(|| format!("unknown sector code: '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_from_str() {
        for sector in Sector::ALL {
            assert_eq!(sector.code().parse::<Sector>().unwrap(), sector);
        }
    }

    #[test]
    fn from_str_is_strict() {
        assert!("Semiconductor".parse::<Sector>().is_err());
        assert!("반도체".parse::<Sector>().is_err());
    }

    #[test]
    fn normalize_maps_korean_and_gics_labels() {
        assert_eq!(Sector::normalize("반도체"), Sector::Semiconductor);
        assert_eq!(Sector::normalize("Health Care"), Sector::Bio);
        assert_eq!(Sector::normalize(" defense "), Sector::Defense);
    }

    #[test]
    fn normalize_falls_back_to_other() {
        assert_eq!(Sector::normalize("우주항공방산식품"), Sector::Other);
        assert_eq!(Sector::normalize(""), Sector::Other);
    }
}
