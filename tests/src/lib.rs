// ============ Fee Distribution Test Suite ============
// Cross-crate tests of the token, escrow, distributor, simulated chain
// and stateful checker.
//
// Test categories:
// 1. Integration: fixture scenarios driven through the chain interface
// 2. Stateful: proptest-generated programs checked end to end
// 3. Properties: escrow supply and distributor conservation under random input

#[cfg(test)]
mod integration;

#[cfg(test)]
mod stateful;

#[cfg(test)]
mod properties;
