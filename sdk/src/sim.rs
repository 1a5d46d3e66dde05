// ============ Simulated Chain ============
// In-memory chain hosting the governance token, fee token, voting escrow
// and (once deployed) the fee distributor.
//
// Every state-changing call mines one block at the pending time. A call
// that fails restores the contracts and block counter to their state
// before the call, so a revert leaves no partial writes behind.

use erc20_token::Erc20;
use fee_distributor::FeeDistributor;
use log::{debug, trace};
use vefee_types::{Address, Receipt, TxContext, GOVERNANCE_INITIAL_SUPPLY};
use voting_escrow::VotingEscrow;

use crate::{ChainError, FeeChain};

// ============ Deployed Contracts ============

#[derive(Clone, Debug)]
struct Contracts {
    governance: Erc20,
    fee_token: Erc20,
    escrow: VotingEscrow,
    distributor: Option<FeeDistributor>,
}

impl Contracts {
    fn distributor(&self) -> Result<&FeeDistributor, ChainError> {
        self.distributor
            .as_ref()
            .ok_or(ChainError::NotDeployed("fee_distributor"))
    }

    fn distributor_mut(&mut self) -> Result<&mut FeeDistributor, ChainError> {
        self.distributor
            .as_mut()
            .ok_or(ChainError::NotDeployed("fee_distributor"))
    }
}

// ============ Chain ============

#[derive(Clone, Debug)]
pub struct SimChain {
    accounts: Vec<Address>,
    now: u64,
    block_number: u64,
    latest_timestamp: u64,
    deploy_nonce: u64,
    contracts: Contracts,
}

impl SimChain {
    /// Fresh chain with `account_count` labelled accounts. Account 0 deploys
    /// the tokens and the escrow and receives the governance supply.
    pub fn new(account_count: usize, genesis_time: u64) -> Result<Self, ChainError> {
        let accounts: Vec<Address> = (0..account_count.max(1))
            .map(|i| Address::from_label(&format!("account-{}", i)))
            .collect();
        let deployer = accounts[0];

        let governance_address = Address::contract(&deployer, 0);
        let fee_address = Address::contract(&deployer, 1);
        let escrow_address = Address::contract(&deployer, 2);

        let mut genesis = TxContext::new(deployer, 0, genesis_time);
        let mut governance = Erc20::new(
            governance_address,
            "Governance Token",
            "GOV",
            18,
            deployer,
        );
        governance.mint(&mut genesis, deployer, GOVERNANCE_INITIAL_SUPPLY)?;
        let fee_token = Erc20::new(fee_address, "Wrapped Ether", "WETH", 18, deployer);
        let escrow = VotingEscrow::new(&genesis, escrow_address, governance_address);

        debug!(
            "genesis at {}: governance={} fee_token={} escrow={}",
            genesis_time, governance_address, fee_address, escrow_address
        );

        Ok(Self {
            accounts,
            now: genesis_time,
            block_number: 0,
            latest_timestamp: genesis_time,
            deploy_nonce: 3,
            contracts: Contracts {
                governance,
                fee_token,
                escrow,
                distributor: None,
            },
        })
    }

    // ============ Contract Access ============

    pub fn admin(&self) -> Address {
        self.accounts[0]
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn governance(&self) -> &Erc20 {
        &self.contracts.governance
    }

    pub fn fee_token(&self) -> &Erc20 {
        &self.contracts.fee_token
    }

    pub fn escrow(&self) -> &VotingEscrow {
        &self.contracts.escrow
    }

    pub fn distributor(&self) -> Result<&FeeDistributor, ChainError> {
        self.contracts.distributor()
    }

    // ============ Deployment ============

    /// Deploy the fee distributor; `start_time` is rounded down to a week
    pub fn deploy_distributor(
        &mut self,
        from: Address,
        start_time: u64,
        admin: Address,
        emergency_return: Address,
    ) -> Result<Address, ChainError> {
        self.check_account(&from)?;
        let address = Address::contract(&from, self.deploy_nonce);
        self.deploy_nonce += 1;

        let escrow = self.contracts.escrow.address;
        let token = self.contracts.fee_token.address;
        self.transact(from, |c, _| {
            c.distributor = Some(FeeDistributor::new(
                address,
                escrow,
                start_time,
                token,
                admin,
                emergency_return,
            ));
            Ok(())
        })?;

        debug!("fee distributor deployed at {} (start {})", address, start_time);
        Ok(address)
    }

    // ============ Governance Token ============

    pub fn approve_governance(
        &mut self,
        from: Address,
        spender: Address,
        value: u128,
    ) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.governance.approve(ctx, spender, value);
            Ok(())
        })
    }

    pub fn transfer_governance(
        &mut self,
        from: Address,
        to: Address,
        value: u128,
    ) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.governance.transfer(ctx, to, value)?;
            Ok(())
        })
    }

    // ============ Extra Escrow / Distributor Calls ============

    pub fn deposit_for(
        &mut self,
        from: Address,
        addr: Address,
        value: u128,
    ) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.escrow.deposit_for(ctx, &mut c.governance, addr, value)?;
            Ok(())
        })
    }

    pub fn checkpoint_total_supply(&mut self, from: Address) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            let distributor = c
                .distributor
                .as_mut()
                .ok_or(ChainError::NotDeployed("fee_distributor"))?;
            distributor.checkpoint_total_supply(ctx, &mut c.escrow);
            Ok(())
        })
    }

    pub fn claim_many(
        &mut self,
        from: Address,
        receivers: &[Address],
    ) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            let distributor = c
                .distributor
                .as_mut()
                .ok_or(ChainError::NotDeployed("fee_distributor"))?;
            distributor.claim_many(ctx, &mut c.escrow, &mut c.fee_token, receivers)?;
            Ok(())
        })
    }

    pub fn kill_distributor(&mut self, from: Address) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            let distributor = c
                .distributor
                .as_mut()
                .ok_or(ChainError::NotDeployed("fee_distributor"))?;
            distributor.kill_me(ctx, &mut c.fee_token)?;
            Ok(())
        })
    }

    // ============ Execution ============

    fn check_account(&self, from: &Address) -> Result<(), ChainError> {
        if self.accounts.contains(from) {
            Ok(())
        } else {
            Err(ChainError::UnknownAccount(*from))
        }
    }

    /// Run `f` as one transaction from `from`, rolling back on error
    fn transact<F>(&mut self, from: Address, f: F) -> Result<Receipt, ChainError>
    where
        F: FnOnce(&mut Contracts, &mut TxContext) -> Result<(), ChainError>,
    {
        self.check_account(&from)?;
        let snapshot = self.contracts.clone();
        let mut ctx = TxContext::new(from, self.block_number + 1, self.now);

        match f(&mut self.contracts, &mut ctx) {
            Ok(()) => {
                self.block_number += 1;
                self.latest_timestamp = self.now;
                trace!("block {} at {}: {} events", self.block_number, self.now, ctx.events.len());
                Ok(Receipt::from_context(ctx))
            }
            Err(e) => {
                self.contracts = snapshot;
                debug!("tx from {} reverted at {}: {}", from, self.now, e);
                Err(e)
            }
        }
    }
}

impl FeeChain for SimChain {
    fn time(&self) -> u64 {
        self.now
    }

    fn latest_timestamp(&self) -> u64 {
        self.latest_timestamp
    }

    fn sleep(&mut self, seconds: u64) {
        self.now += seconds;
    }

    fn mine(&mut self) -> Receipt {
        self.block_number += 1;
        self.latest_timestamp = self.now;
        Receipt {
            block_number: self.block_number,
            timestamp: self.now,
            events: Vec::new(),
        }
    }

    fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    fn create_lock(
        &mut self,
        from: Address,
        value: u128,
        unlock_time: u64,
    ) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.escrow.create_lock(ctx, &mut c.governance, value, unlock_time)?;
            Ok(())
        })
    }

    fn increase_amount(&mut self, from: Address, value: u128) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.escrow.increase_amount(ctx, &mut c.governance, value)?;
            Ok(())
        })
    }

    fn increase_unlock_time(
        &mut self,
        from: Address,
        unlock_time: u64,
    ) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.escrow.increase_unlock_time(ctx, &mut c.governance, unlock_time)?;
            Ok(())
        })
    }

    fn withdraw(&mut self, from: Address) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.escrow.withdraw(ctx, &mut c.governance)?;
            Ok(())
        })
    }

    fn locked_end(&self, addr: &Address) -> Result<u64, ChainError> {
        Ok(self.contracts.escrow.locked_end(addr))
    }

    fn distributor_address(&self) -> Result<Address, ChainError> {
        Ok(self.contracts.distributor()?.address)
    }

    fn claim(&mut self, from: Address) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            let distributor = c
                .distributor
                .as_mut()
                .ok_or(ChainError::NotDeployed("fee_distributor"))?;
            distributor.claim(ctx, &mut c.escrow, &mut c.fee_token, from)?;
            Ok(())
        })
    }

    fn checkpoint_token(&mut self, from: Address) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            let distributor = c
                .distributor
                .as_mut()
                .ok_or(ChainError::NotDeployed("fee_distributor"))?;
            distributor.checkpoint_token(ctx, &c.fee_token)?;
            Ok(())
        })
    }

    fn toggle_allow_checkpoint_token(&mut self, from: Address) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.distributor_mut()?.toggle_allow_checkpoint_token(ctx)?;
            Ok(())
        })
    }

    fn can_checkpoint_token(&self) -> Result<bool, ChainError> {
        Ok(self.contracts.distributor()?.can_checkpoint_token())
    }

    fn start_time(&self) -> Result<u64, ChainError> {
        Ok(self.contracts.distributor()?.start_time())
    }

    fn tokens_per_week(&self, week: u64) -> Result<u128, ChainError> {
        Ok(self.contracts.distributor()?.tokens_per_week(week))
    }

    fn ve_for_at(&self, user: &Address, timestamp: u64) -> Result<u128, ChainError> {
        let distributor = self.contracts.distributor()?;
        Ok(distributor.ve_for_at(&self.contracts.escrow, user, timestamp))
    }

    fn ve_supply(&self, week: u64) -> Result<u128, ChainError> {
        Ok(self.contracts.distributor()?.ve_supply(week))
    }

    fn time_cursor_of(&self, addr: &Address) -> Result<u64, ChainError> {
        Ok(self.contracts.distributor()?.time_cursor_of(addr))
    }

    fn fee_balance_of(&self, addr: &Address) -> Result<u128, ChainError> {
        Ok(self.contracts.fee_token.balance_of(addr))
    }

    fn mint_fees(
        &mut self,
        from: Address,
        to: Address,
        value: u128,
    ) -> Result<Receipt, ChainError> {
        self.transact(from, |c, ctx| {
            c.fee_token.mint_for_testing(ctx, to, value)?;
            Ok(())
        })
    }
}

// ============ Tests ============
