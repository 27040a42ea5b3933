//! Caller identity and the MSP directory
//!
//! The host attests each caller with a membership-service-provider id
//! string. The directory maps those strings to exchange roles; it is
//! plain configuration data so deployments can register their own
//! organizations instead of relying on baked-in names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::ids::BrokerId;

/// Role an organization plays on the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Role {
    /// The exchange operator: lists securities, runs matching, settles
    Exchange,
    /// The market regulator: owns rules, broker standing and trade checks
    Regulator,
    /// A broker organization acting for the given broker id
    Broker {
        #[serde(rename = "brokerID")]
        broker_id: BrokerId,
    },
}

impl Role {
    pub fn broker(broker_id: impl Into<String>) -> Self {
        Self::Broker {
            broker_id: BrokerId::new(broker_id),
        }
    }
}

/// An authenticated caller: the attested MSP id plus its resolved role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub msp_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(msp_id: impl Into<String>, role: Role) -> Self {
        Self {
            msp_id: msp_id.into(),
            role,
        }
    }

    pub fn is_exchange(&self) -> bool {
        self.role == Role::Exchange
    }

    pub fn is_regulator(&self) -> bool {
        self.role == Role::Regulator
    }

    /// The broker id this caller acts for, when it is a broker
    pub fn broker_id(&self) -> Option<&BrokerId> {
        match &self.role {
            Role::Broker { broker_id } => Some(broker_id),
            _ => None,
        }
    }

    /// Exchange may act for anyone; a broker only for itself
    pub fn can_act_for(&self, broker: &BrokerId) -> bool {
        match &self.role {
            Role::Exchange => true,
            Role::Broker { broker_id } => broker_id == broker,
            Role::Regulator => false,
        }
    }

    /// Exchange and regulator see every record; brokers only their own
    pub fn can_view_all(&self) -> bool {
        matches!(self.role, Role::Exchange | Role::Regulator)
    }
}

/// MSP-to-role directory, deserializable from deployment configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityDirectory {
    entries: BTreeMap<String, Role>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, msp_id: impl Into<String>, role: Role) {
        self.entries.insert(msp_id.into(), role);
    }

    /// Resolve an attested MSP id to an authenticated caller. Unknown
    /// organizations get nothing.
    pub fn authenticate(&self, msp_id: &str) -> Option<Caller> {
        self.entries
            .get(msp_id)
            .map(|role| Caller::new(msp_id, role.clone()))
    }

    /// The four-organization demo network
    pub fn demo() -> Self {
        let mut directory = Self::new();
        directory.register("StockMarketMSP", Role::Exchange);
        directory.register("AMMCMSP", Role::Regulator);
        directory.register("Broker1MSP", Role::broker("broker1"));
        directory.register("Broker2MSP", Role::broker("broker2"));
        directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_directory_resolution() {
        let directory = IdentityDirectory::demo();
        assert!(directory.authenticate("StockMarketMSP").unwrap().is_exchange());
        assert!(directory.authenticate("AMMCMSP").unwrap().is_regulator());
        let broker = directory.authenticate("Broker1MSP").unwrap();
        assert_eq!(broker.broker_id(), Some(&BrokerId::new("broker1")));
        assert!(directory.authenticate("EveMSP").is_none());
    }

    #[test]
    fn test_can_act_for() {
        let exchange = Caller::new("StockMarketMSP", Role::Exchange);
        let broker1 = Caller::new("Broker1MSP", Role::broker("broker1"));
        let regulator = Caller::new("AMMCMSP", Role::Regulator);
        let target = BrokerId::new("broker1");
        let other = BrokerId::new("broker2");

        assert!(exchange.can_act_for(&target));
        assert!(broker1.can_act_for(&target));
        assert!(!broker1.can_act_for(&other));
        assert!(!regulator.can_act_for(&target));
    }

    #[test]
    fn test_view_visibility() {
        assert!(Caller::new("StockMarketMSP", Role::Exchange).can_view_all());
        assert!(Caller::new("AMMCMSP", Role::Regulator).can_view_all());
        assert!(!Caller::new("Broker1MSP", Role::broker("broker1")).can_view_all());
    }

    #[test]
    fn test_directory_is_configuration() {
        let json = r#"{
            "BourseMSP": {"role": "exchange"},
            "WatchdogMSP": {"role": "regulator"},
            "HouseMSP": {"role": "broker", "brokerID": "house"}
        }"#;
        let directory: IdentityDirectory = serde_json::from_str(json).unwrap();
        assert!(directory.authenticate("BourseMSP").unwrap().is_exchange());
        assert_eq!(
            directory.authenticate("HouseMSP").unwrap().broker_id(),
            Some(&BrokerId::new("house"))
        );
    }
}
