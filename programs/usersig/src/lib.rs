use anchor_lang::prelude::*;
use graph::instructions::{AddRelationParams, DisconnectRelationParams, InitializeProviderParams};
use graph::program::Graph;
use graph::{Controller, Provider, Relation, CONTROLLER_SEED};

declare_id!("s1gsZrDJAXNYSCRhQZk5X3mYyBjAmaVBTYnNhCzj8t2");

/// Seed of this program's provider PDA, which is also its own authority.
pub const PROVIDER_SEED: &[u8] = b"provider";

const PROVIDER_NAME: &str = "User manual signature relations";
const PROVIDER_WEBSITE: &str = "https://example.com/docs";

#[error_code]
pub enum UsersigError {
    #[msg("Only the relation's origin may retract it")]
    NotRelationOrigin,
}

#[program]
pub mod usersig {
    use super::*;

    /// One time permissionless provider registration
    pub fn initialize(ctx: Context<Initialize>) -> Result<()> {
        let params = InitializeProviderParams {
            authority: ctx.accounts.provider.key(),
            name: PROVIDER_NAME.to_owned(),
            website: PROVIDER_WEBSITE.to_owned(),
        };

        let bump = [ctx.bumps.provider];
        let signer_seeds: &[&[&[u8]]] = &[&[PROVIDER_SEED, &bump]];
        let cpi_ctx = ctx
            .accounts
            .initialize_provider_ctx()
            .with_signer(signer_seeds);
        graph::cpi::initialize_provider(cpi_ctx, params)?;

        msg!("USERSIG: Provider {} initialized", ctx.accounts.provider.key());
        Ok(())
    }

    /// Add a relation from the signing user to `to`
    pub fn sign_relation(ctx: Context<SignRelation>, to: Pubkey) -> Result<()> {
        let params = AddRelationParams {
            from: ctx.accounts.from.key(),
            to,
            extra: vec![],
        };

        let bump = [ctx.bumps.provider];
        let signer_seeds: &[&[&[u8]]] = &[&[PROVIDER_SEED, &bump]];
        let cpi_ctx = ctx.accounts.add_relation_ctx().with_signer(signer_seeds);
        graph::cpi::add_relation(cpi_ctx, params)?;

        msg!("USERSIG: {} signed relation to {}", ctx.accounts.from.key(), to);
        Ok(())
    }

    /// Disconnect a relation the signing user published earlier
    pub fn unsign_relation(ctx: Context<UnsignRelation>, args: UnsignRelationParams) -> Result<()> {
        require_keys_eq!(
            args.relation.from,
            ctx.accounts.from.key(),
            UsersigError::NotRelationOrigin
        );
        let to = args.relation.to;

        let params = DisconnectRelationParams {
            relation: args.relation,
            leaf_index: args.leaf_index,
            root: args.root,
            proof: args.proof,
        };

        let bump = [ctx.bumps.provider];
        let signer_seeds: &[&[&[u8]]] = &[&[PROVIDER_SEED, &bump]];
        let cpi_ctx = ctx
            .accounts
            .disconnect_relation_ctx()
            .with_signer(signer_seeds);
        graph::cpi::disconnect_relation(cpi_ctx, params)?;

        msg!("USERSIG: {} unsigned relation to {}", ctx.accounts.from.key(), to);
        Ok(())
    }
}

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct UnsignRelationParams {
    pub relation: Relation,
    pub leaf_index: u32,
    pub root: [u8; 32],
    pub proof: Vec<[u8; 32]>,
}

#[derive(Accounts)]
pub struct Initialize<'info> {
    /// CHECK: seeds are checked; created by the graph program
    #[account(mut, seeds = [PROVIDER_SEED], bump)]
    pub provider: AccountInfo<'info>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub graph_program: Program<'info, Graph>,
    pub system_program: Program<'info, System>,
}

impl<'info> Initialize<'info> {
    pub fn initialize_provider_ctx(
        &self,
    ) -> CpiContext<'_, '_, '_, 'info, graph::cpi::accounts::InitializeProvider<'info>> {
        let cpi_program = self.graph_program.to_account_info();
        let cpi_accounts = graph::cpi::accounts::InitializeProvider {
            provider: self.provider.to_account_info(),
            payer: self.payer.to_account_info(),
            system_program: self.system_program.to_account_info(),
        };
        CpiContext::new(cpi_program, cpi_accounts)
    }
}

#[derive(Accounts)]
pub struct SignRelation<'info> {
    pub from: Signer<'info>,

    #[account(mut, seeds = [PROVIDER_SEED], bump)]
    pub provider: Account<'info, Provider>,

    /// CHECK: checked against the controller here and by the graph program
    #[account(mut)]
    pub tree: AccountInfo<'info>,

    #[account(
        seeds = [CONTROLLER_SEED],
        seeds::program = graph_program.key(),
        bump = tree_controller.bump,
        has_one = tree,
    )]
    pub tree_controller: Account<'info, Controller>,

    pub graph_program: Program<'info, Graph>,
}

impl<'info> SignRelation<'info> {
    pub fn add_relation_ctx(
        &self,
    ) -> CpiContext<'_, '_, '_, 'info, graph::cpi::accounts::AddRelation<'info>> {
        let cpi_program = self.graph_program.to_account_info();
        let cpi_accounts = graph::cpi::accounts::AddRelation {
            provider: self.provider.to_account_info(),
            authority: self.provider.to_account_info(),
            tree: self.tree.to_account_info(),
            tree_controller: self.tree_controller.to_account_info(),
        };
        CpiContext::new(cpi_program, cpi_accounts)
    }
}

#[derive(Accounts)]
pub struct UnsignRelation<'info> {
    pub from: Signer<'info>,

    #[account(seeds = [PROVIDER_SEED], bump)]
    pub provider: Account<'info, Provider>,

    /// CHECK: checked against the controller here and by the graph program
    #[account(mut)]
    pub tree: AccountInfo<'info>,

    #[account(
        seeds = [CONTROLLER_SEED],
        seeds::program = graph_program.key(),
        bump = tree_controller.bump,
        has_one = tree,
    )]
    pub tree_controller: Account<'info, Controller>,

    pub graph_program: Program<'info, Graph>,
}

impl<'info> UnsignRelation<'info> {
    pub fn disconnect_relation_ctx(
        &self,
    ) -> CpiContext<'_, '_, '_, 'info, graph::cpi::accounts::DisconnectRelation<'info>> {
        let cpi_program = self.graph_program.to_account_info();
        let cpi_accounts = graph::cpi::accounts::DisconnectRelation {
            provider: self.provider.to_account_info(),
            authority: self.provider.to_account_info(),
            tree: self.tree.to_account_info(),
            tree_controller: self.tree_controller.to_account_info(),
        };
        CpiContext::new(cpi_program, cpi_accounts)
    }
}
