//! Fixed, ordered account pool carved into reserved roles and oracles.

use serde::Serialize;

use crate::error::AccountPoolError;
use crate::models::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// Contract owner, also the airline registered at deployment.
    Owner,
    Passenger,
    Oracle,
    Unassigned,
}

#[derive(Debug, Clone)]
pub struct AccountPool {
    identities: Vec<Identity>,
    reserved: usize,
    oracle_count: usize,
}

impl AccountPool {
    pub fn new(
        identities: Vec<Identity>,
        reserved: usize,
        oracle_count: usize,
    ) -> Result<Self, AccountPoolError> {
        if reserved == 0 {
            return Err(AccountPoolError::NoReservedAccounts);
        }

        let required = reserved + oracle_count;
        if identities.len() < required {
            return Err(AccountPoolError::TooFewAccounts {
                available: identities.len(),
                required,
                reserved,
                oracles: oracle_count,
            });
        }

        Ok(Self {
            identities,
            reserved,
            oracle_count,
        })
    }

    pub fn owner(&self) -> &Identity {
        &self.identities[0]
    }

    /// The airline registered when the contract was deployed.
    pub fn first_airline(&self) -> &Identity {
        self.owner()
    }

    pub fn passengers(&self) -> &[Identity] {
        &self.identities[1..self.reserved]
    }

    pub fn oracles(&self) -> &[Identity] {
        &self.identities[self.reserved..self.reserved + self.oracle_count]
    }

    pub fn role_of(&self, identity: &Identity) -> Option<AccountRole> {
        let position = self.identities.iter().position(|candidate| candidate == identity)?;
        let role = match position {
            0 => AccountRole::Owner,
            p if p < self.reserved => AccountRole::Passenger,
            p if p < self.reserved + self.oracle_count => AccountRole::Oracle,
            _ => AccountRole::Unassigned,
        };
        Some(role)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identities(count: usize) -> Vec<Identity> {
        (0..count).map(|i| Identity::new(format!("0x{i:02}"))).collect()
    }

    #[test]
    fn partitions_reserved_roles_and_oracles() {
        let pool = AccountPool::new(identities(50), 6, 40).unwrap();

        assert_eq!(pool.owner(), &Identity::new("0x00"));
        assert_eq!(pool.first_airline(), pool.owner());
        assert_eq!(pool.passengers().len(), 5);
        assert_eq!(pool.oracles().len(), 40);
        assert_eq!(pool.oracles()[0], Identity::new("0x06"));
        assert_eq!(pool.oracles()[39], Identity::new("0x45"));

        assert_eq!(pool.role_of(&Identity::new("0x00")), Some(AccountRole::Owner));
        assert_eq!(pool.role_of(&Identity::new("0x03")), Some(AccountRole::Passenger));
        assert_eq!(pool.role_of(&Identity::new("0x06")), Some(AccountRole::Oracle));
        assert_eq!(pool.role_of(&Identity::new("0x46")), Some(AccountRole::Unassigned));
        assert_eq!(pool.role_of(&Identity::new("0xff")), None);
    }

    #[test]
    fn rejects_pools_that_are_too_small() {
        let err = AccountPool::new(identities(45), 6, 40).unwrap_err();
        assert_eq!(
            err,
            AccountPoolError::TooFewAccounts {
                available: 45,
                required: 46,
                reserved: 6,
                oracles: 40
            }
        );
        assert_eq!(
            AccountPool::new(identities(10), 0, 5).unwrap_err(),
            AccountPoolError::NoReservedAccounts
        );
    }
}
