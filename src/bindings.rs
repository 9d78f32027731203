//! Solidity ABI bindings for ERC-20 USDC, the CCTP V2 contracts and the
//! destination hook executor.

use alloy::sol;

sol!(
    #[sol(rpc)]
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);

        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }
);

sol!(
    #[sol(rpc)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug, PartialEq, Eq)]
    interface TokenMessengerV2 {
        event DepositForBurn(
            address indexed burnToken,
            uint256 amount,
            address indexed depositor,
            bytes32 mintRecipient,
            uint32 destinationDomain,
            bytes32 destinationTokenMessenger,
            bytes32 destinationCaller,
            uint256 maxFee,
            uint32 indexed minFinalityThreshold,
            bytes hookData
        );

        function depositForBurn(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken,
            bytes32 destinationCaller,
            uint256 maxFee,
            uint32 minFinalityThreshold
        ) external;

        function depositForBurnWithHook(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken,
            bytes32 destinationCaller,
            uint256 maxFee,
            uint32 minFinalityThreshold,
            bytes hookData
        ) external;

        function getMinFeeAmount(uint256 amount) external view returns (uint256);
    }
);

sol!(
    #[sol(rpc)]
    #[derive(Debug, PartialEq, Eq)]
    interface MessageTransmitterV2 {
        event MessageSent(bytes message);

        function receiveMessage(bytes message, bytes attestation) external returns (bool success);
        function usedNonces(bytes32 nonce) external view returns (uint256);
    }
);

sol!(
    #[sol(rpc)]
    #[derive(Debug, PartialEq, Eq)]
    interface HookExecutor {
        function executeHook(bytes hookData) external;
    }
);
