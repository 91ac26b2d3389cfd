use anchor_lang::prelude::*;

use crate::errors::GraphError;

/// A registered publisher of relations. Every relation is attributed to
/// exactly one provider and only its `authority` may write on its behalf.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct Provider {
    pub authority: Pubkey,
    /// Relations ever appended by this provider; never decreases
    pub relations_count: u64,
    pub name: String,
    pub website: String,
}

impl Provider {
    pub const MAX_NAME_LEN: usize = 64;
    pub const MAX_WEBSITE_LEN: usize = 128;

    /// Account size for the given metadata.
    pub fn space(name: &str, website: &str) -> usize {
        8 +                      // discriminator
        32 +                     // authority
        8 +                      // relations_count
        4 + name.len() +         // name
        4 + website.len()        // website
    }

    pub fn is_initialized(&self) -> bool {
        self.authority != Pubkey::default()
    }

    /// Fill a freshly allocated provider account.
    pub fn register(&mut self, authority: Pubkey, name: String, website: String) -> Result<()> {
        require!(!self.is_initialized(), GraphError::DuplicateProvider);
        require!(authority != Pubkey::default(), GraphError::Unauthorized);
        require!(
            name.len() <= Self::MAX_NAME_LEN && website.len() <= Self::MAX_WEBSITE_LEN,
            GraphError::ProviderInfoTooLong
        );

        self.authority = authority;
        self.relations_count = 0;
        self.name = name;
        self.website = website;
        Ok(())
    }

    /// Count one more appended relation. Returns the new total.
    pub fn record_relation(&mut self) -> Result<u64> {
        self.relations_count = self
            .relations_count
            .checked_add(1)
            .ok_or_else(|| error!(GraphError::Overflow))?;
        Ok(self.relations_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::Discriminator;

    fn blank() -> Provider {
        Provider {
            authority: Pubkey::default(),
            relations_count: 0,
            name: String::new(),
            website: String::new(),
        }
    }

    #[test]
    fn test_register_and_round_trip() {
        let authority = Pubkey::new_unique();
        let mut provider = blank();
        provider
            .register(authority, "usersig".to_string(), "https://example.com".to_string())
            .unwrap();

        let mut data = Vec::new();
        provider.try_serialize(&mut data).unwrap();
        assert_eq!(data.len(), Provider::space("usersig", "https://example.com"));
        assert_eq!(&data[..8], &Provider::DISCRIMINATOR[..]);

        let decoded = Provider::try_deserialize(&mut data.as_slice()).unwrap();
        assert_eq!(decoded, provider);
        assert_eq!(decoded.authority, authority);
    }

    #[test]
    fn test_register_twice_is_duplicate() {
        let mut provider = blank();
        provider
            .register(Pubkey::new_unique(), "a".to_string(), String::new())
            .unwrap();
        let err = provider
            .register(Pubkey::new_unique(), "a".to_string(), String::new())
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateProvider.into());
    }

    #[test]
    fn test_register_rejects_bad_input() {
        let err = blank()
            .register(Pubkey::default(), "a".to_string(), String::new())
            .unwrap_err();
        assert_eq!(err, GraphError::Unauthorized.into());

        let long_name = "n".repeat(Provider::MAX_NAME_LEN + 1);
        let err = blank()
            .register(Pubkey::new_unique(), long_name, String::new())
            .unwrap_err();
        assert_eq!(err, GraphError::ProviderInfoTooLong.into());

        let long_site = "w".repeat(Provider::MAX_WEBSITE_LEN + 1);
        let err = blank()
            .register(Pubkey::new_unique(), String::new(), long_site)
            .unwrap_err();
        assert_eq!(err, GraphError::ProviderInfoTooLong.into());
    }

    #[test]
    fn test_relations_count_is_checked() {
        let mut provider = blank();
        assert_eq!(provider.record_relation().unwrap(), 1);
        assert_eq!(provider.record_relation().unwrap(), 2);

        provider.relations_count = u64::MAX;
        let err = provider.record_relation().unwrap_err();
        assert_eq!(err, GraphError::Overflow.into());
        assert_eq!(provider.relations_count, u64::MAX);
    }
}
