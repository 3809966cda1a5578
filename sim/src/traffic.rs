//! Traffic classes, priorities and flows.

use std::fmt;

/// Scheduling priority. Higher weight is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Bronze,
    Silver,
    Gold,
}

impl Priority {
    pub fn weight(&self) -> u32 {
        match self {
            Priority::Gold => 10,
            Priority::Silver => 3,
            Priority::Bronze => 1,
        }
    }
}

/// Closed set of traffic classes carried by the WAN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    Voip,    // jitter sensitive, low bandwidth
    Emr,     // patient records, transactional
    Dns,
    Ntp,
    Dicom,   // imaging, bursty
    Iot,     // constant low-rate sensors
    Guest,   // public Wi-Fi
    Http,
    General, // mesh traffic crossing sites
    Bulk,    // backups and large transfers
    Ddos,    // flood traffic
}

impl TrafficClass {
    pub const COUNT: usize = 11;

    pub const ALL: [TrafficClass; Self::COUNT] = [
        TrafficClass::Voip,
        TrafficClass::Emr,
        TrafficClass::Dns,
        TrafficClass::Ntp,
        TrafficClass::Dicom,
        TrafficClass::Iot,
        TrafficClass::Guest,
        TrafficClass::Http,
        TrafficClass::General,
        TrafficClass::Bulk,
        TrafficClass::Ddos,
    ];

    pub fn priority(&self) -> Priority {
        match self {
            TrafficClass::Voip | TrafficClass::Emr | TrafficClass::Dns | TrafficClass::Ntp => {
                Priority::Gold
            }
            TrafficClass::Dicom | TrafficClass::Iot => Priority::Silver,
            TrafficClass::Guest
            | TrafficClass::Http
            | TrafficClass::General
            | TrafficClass::Bulk
            | TrafficClass::Ddos => Priority::Bronze,
        }
    }

    /// Dense index for per-class tallies
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrafficClass::Voip => "VOIP",
            TrafficClass::Emr => "EMR",
            TrafficClass::Dns => "DNS",
            TrafficClass::Ntp => "NTP",
            TrafficClass::Dicom => "DICOM",
            TrafficClass::Iot => "IOT",
            TrafficClass::Guest => "GUEST",
            TrafficClass::Http => "HTTP",
            TrafficClass::General => "GENERAL",
            TrafficClass::Bulk => "BULK",
            TrafficClass::Ddos => "DDOS",
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Offered demand on one directed link for the current tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flow {
    pub class: TrafficClass,
    pub rate: f64, // Mbps
}

impl Flow {
    pub fn new(class: TrafficClass, rate: f64) -> Self {
        Self { class, rate }
    }

    pub fn priority(&self) -> Priority {
        self.class.priority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_table() {
        assert_eq!(TrafficClass::Voip.priority(), Priority::Gold);
        assert_eq!(TrafficClass::Ntp.priority(), Priority::Gold);
        assert_eq!(TrafficClass::Dicom.priority(), Priority::Silver);
        assert_eq!(TrafficClass::Iot.priority(), Priority::Silver);
        assert_eq!(TrafficClass::Guest.priority(), Priority::Bronze);
        assert_eq!(TrafficClass::Ddos.priority(), Priority::Bronze);
    }

    #[test]
    fn test_weights_order_priorities() {
        assert_eq!(Priority::Gold.weight(), 10);
        assert_eq!(Priority::Silver.weight(), 3);
        assert_eq!(Priority::Bronze.weight(), 1);
        assert!(Priority::Gold > Priority::Silver && Priority::Silver > Priority::Bronze);
    }

    #[test]
    fn test_class_indices_are_dense() {
        for (i, class) in TrafficClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
        }
    }

    #[test]
    fn test_class_names() {
        assert_eq!(TrafficClass::Voip.name(), "VOIP");
        assert_eq!(TrafficClass::Dicom.to_string(), "DICOM");
        assert_eq!(format!("{}", TrafficClass::Ddos), "DDOS");
    }
}
