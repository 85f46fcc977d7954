use alloy::sol;

sol! {
    /// Emitted by the CTF and NegRisk exchanges whenever two orders match.
    #[derive(Debug, PartialEq, Eq)]
    event OrderFilled(
        bytes32 indexed orderHash,
        address indexed maker,
        address indexed taker,
        uint256 makerAssetId,
        uint256 takerAssetId,
        uint256 makerAmountFilled,
        uint256 takerAmountFilled,
        uint256 fee
    );
}
