use anchor_lang::prelude::*;

/// Tree controller: binds this deployment to its commitment tree.
/// Singleton at the `[CONTROLLER_SEED]` PDA.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct Controller {
    /// Key that initialized the controller and may bind the tree
    pub authority: Pubkey,
    /// Bound tree account, default until `initialize_tree`
    pub tree: Pubkey,
    /// PDA bump seed
    pub bump: u8,
}

impl Controller {
    pub const SIZE: usize = 8 +  // discriminator
        32 +                     // authority
        32 +                     // tree
        1;                       // bump
    // Total: 73 bytes

    pub fn is_initialized(&self) -> bool {
        self.authority != Pubkey::default()
    }

    pub fn is_bound(&self) -> bool {
        self.tree != Pubkey::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::Discriminator;

    #[test]
    fn test_controller_round_trip() {
        let controller = Controller {
            authority: Pubkey::new_unique(),
            tree: Pubkey::new_unique(),
            bump: 254,
        };
        let mut data = Vec::new();
        controller.try_serialize(&mut data).unwrap();
        assert_eq!(data.len(), Controller::SIZE);
        assert_eq!(&data[..8], &Controller::DISCRIMINATOR[..]);

        let decoded = Controller::try_deserialize(&mut data.as_slice()).unwrap();
        assert_eq!(decoded, controller);
        assert!(decoded.is_initialized());
        assert!(decoded.is_bound());
    }

    #[test]
    fn test_zeroed_controller_is_unbound() {
        let controller = Controller {
            authority: Pubkey::default(),
            tree: Pubkey::default(),
            bump: 0,
        };
        assert!(!controller.is_initialized());
        assert!(!controller.is_bound());
    }
}
