//! CREATE2 address derivation
//!
//! `address = keccak256(0xff ++ deployer ++ salt ++ keccak256(init_code))[12..]`
//!
//! There is no on-chain check ahead of deployment, so a wrong constructor
//! argument encoding or salt width produces a valid-looking but wrong
//! address. [`derive_precomputed`] asks the factory instead when exact
//! agreement with deployed behavior matters.

use crate::abi::{self, AbiType, AbiValue};
use crate::client::ChainReader;
use crate::crypto::keccak256;
use crate::{Result, Salt};
use alloy_primitives::{Address, Bytes, B256};

/// Contract creation code with an optional constructor argument segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitCode(Bytes);

impl InitCode {
    pub fn new(creation_code: impl Into<Bytes>) -> Self {
        Self(creation_code.into())
    }

    /// Append ABI-encoded constructor arguments
    pub fn with_constructor_args(self, args: &[(AbiType, AbiValue)]) -> Result<Self> {
        let encoded = abi::encode(args)?;
        let mut code = Vec::with_capacity(self.0.len() + encoded.len());
        code.extend_from_slice(&self.0);
        code.extend_from_slice(&encoded);
        Ok(Self(code.into()))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn hash(&self) -> B256 {
        keccak256(&self.0)
    }
}

impl From<Vec<u8>> for InitCode {
    fn from(code: Vec<u8>) -> Self {
        Self::new(code)
    }
}

/// Derive the address `deployer` will create for `init_code` under `salt`
pub fn derive_address(deployer: Address, salt: &Salt, init_code: &InitCode) -> Address {
    derive_from_hash(deployer, salt, &init_code.hash())
}

/// Derive from an already computed init code hash
pub fn derive_from_hash(deployer: Address, salt: &Salt, init_code_hash: &B256) -> Address {
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(deployer.as_slice());
    preimage[21..53].copy_from_slice(salt.as_bytes());
    preimage[53..85].copy_from_slice(init_code_hash.as_slice());
    Address::from_slice(&keccak256(preimage)[12..])
}

/// Ask the factory for the address it will deploy for `owner`
pub async fn derive_precomputed<R>(reader: &R, factory: Address, owner: Address) -> Result<Address>
where
    R: ChainReader + ?Sized,
{
    reader.calculate_address(factory, owner).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_address;
    use alloy_primitives::{address, b256, U256};
    use proptest::prelude::*;

    #[test]
    fn test_eip1014_vectors() {
        // example 0 of EIP-1014
        let addr = derive_address(Address::ZERO, &Salt::ZERO, &InitCode::new(vec![0x00]));
        assert_eq!(addr, address!("4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38"));

        // example 1
        let deployer = address!("deadbeef00000000000000000000000000000000");
        let addr = derive_address(deployer, &Salt::ZERO, &InitCode::new(vec![0x00]));
        assert_eq!(addr, address!("b928f69bb1d91cd65274e3c79d8986362984fda3"));

        // example 2
        let salt = Salt::new(b256!("000000000000000000000000feed000000000000000000000000000000000000"));
        let addr = derive_address(deployer, &salt, &InitCode::new(vec![0x00]));
        assert_eq!(addr, address!("d04116cdd17bebe565eb2422f2497e06cc1c9833"));

        // example 6: empty init code
        let addr = derive_address(Address::ZERO, &Salt::ZERO, &InitCode::default());
        assert_eq!(addr, address!("e33c0c7f7df4809055c3eba6c09cfe4baf1bd9e0"));
    }

    #[test]
    fn test_matches_alloy_create2() {
        let deployer = Address::repeat_byte(0x42);
        let salt = Salt::from(7u64);
        let code = InitCode::new(vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(
            derive_address(deployer, &salt, &code),
            deployer.create2_from_code(*salt.as_b256(), code.bytes())
        );
    }

    #[test]
    fn test_case_insensitive_comparison() {
        let lower = parse_address("0x4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38").unwrap();
        let upper = parse_address("0x4D1A2E2BB4F88F0250F26FFFF098B0B30B26BF38").unwrap();
        let derived = derive_address(Address::ZERO, &Salt::ZERO, &InitCode::new(vec![0x00]));
        assert_eq!(derived, lower);
        assert_eq!(derived, upper);
    }

    #[test]
    fn test_constructor_args_appended() {
        let owner = Address::repeat_byte(0xaa);
        let code = InitCode::new(vec![0xde, 0xad])
            .with_constructor_args(&[(AbiType::Address, AbiValue::Address(owner))])
            .unwrap();

        assert_eq!(code.bytes().len(), 2 + 32);
        assert_eq!(&code.bytes()[..2], &[0xde, 0xad]);
        assert_eq!(&code.bytes()[14..], owner.as_slice());

        let bad = InitCode::new(vec![0x00]).with_constructor_args(&[(AbiType::Address, AbiValue::Uint(U256::from(1), 256))]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_from_hash_agrees() {
        let code = InitCode::new(vec![1, 2, 3]);
        let deployer = Address::repeat_byte(0x01);
        assert_eq!(
            derive_address(deployer, &Salt::ZERO, &code),
            derive_from_hash(deployer, &Salt::ZERO, &code.hash())
        );
    }

    proptest! {
        #[test]
        fn prop_derivation_is_pure(
            deployer in any::<[u8; 20]>(),
            salt in any::<[u8; 32]>(),
            code in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let deployer = Address::from(deployer);
            let salt = Salt::new(B256::from(salt));
            let code = InitCode::new(code);
            prop_assert_eq!(derive_address(deployer, &salt, &code), derive_address(deployer, &salt, &code));
        }

        #[test]
        fn prop_single_byte_change_changes_address(
            deployer in any::<[u8; 20]>(),
            salt in any::<[u8; 32]>(),
            code in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
        ) {
            let expected = derive_address(
                Address::from(deployer),
                &Salt::new(B256::from(salt)),
                &InitCode::new(code.clone()),
            );

            let mut flipped_deployer = deployer;
            flipped_deployer[index.index(20)] ^= 0x01;
            prop_assert_ne!(
                derive_address(Address::from(flipped_deployer), &Salt::new(B256::from(salt)), &InitCode::new(code.clone())),
                expected
            );

            let mut flipped_salt = salt;
            flipped_salt[index.index(32)] ^= 0x01;
            prop_assert_ne!(
                derive_address(Address::from(deployer), &Salt::new(B256::from(flipped_salt)), &InitCode::new(code.clone())),
                expected
            );

            let mut flipped_code = code;
            let at = index.index(flipped_code.len());
            flipped_code[at] ^= 0x01;
            prop_assert_ne!(
                derive_address(Address::from(deployer), &Salt::new(B256::from(salt)), &InitCode::new(flipped_code)),
                expected
            );
        }
    }
}
