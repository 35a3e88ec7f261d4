/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VehicleKey {
    /// Messages for one vehicle.
    Vin(String),
    /// Messages for every vehicle of the account (single-level wildcard).
    AnyVehicle,
    /// Everything published under the account (multi-level wildcard).
    AnyTopic,
}

impl VehicleKey {
    pub fn vin(vin: impl Into<String>) -> Self {
        Self::Vin(vin.into())
    }

    /// Broker topic filter for this key under the account's `gcid`.
    pub fn topic(&self, gcid: &str) -> String {
        match self {
            Self::Vin(vin) => format!("{gcid}/{vin}"),
            Self::AnyVehicle => format!("{gcid}/+"),
            Self::AnyTopic => format!("{gcid}/#"),
        }
    }
}

impl std::fmt::Display for VehicleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vin(vin) => f.write_str(vin),
            Self::AnyVehicle => f.write_str("+"),
            Self::AnyTopic => f.write_str("#"),
        }
    }
}
