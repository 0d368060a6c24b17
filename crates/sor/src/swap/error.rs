/// Arithmetic errors raised by the on-chain accurate math. The messages
/// carry the error codes of the contracts they are emulating.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("BAL#000 ADD_OVERFLOW")]
    AddOverflow,
    #[error("BAL#001 SUB_OVERFLOW")]
    SubOverflow,
    #[error("BAL#003 MUL_OVERFLOW")]
    MulOverflow,
    #[error("BAL#004 ZERO_DIVISION")]
    ZeroDivision,
    #[error("BAL#005 DIV_INTERNAL")]
    DivInternal,
    #[error("BAL#006 X_OUT_OF_BOUNDS")]
    XOutOfBounds,
    #[error("BAL#007 Y_OUT_OF_BOUNDS")]
    YOutOfBounds,
    #[error("BAL#008 PRODUCT_OUT_OF_BOUNDS")]
    ProductOutOfBounds,
    #[error("BAL#009 INVALID_EXPONENT")]
    InvalidExponent,
    #[error("ERR_BPOW_BASE_TOO_LOW")]
    BpowBaseTooLow,
    #[error("ERR_BPOW_BASE_TOO_HIGH")]
    BpowBaseTooHigh,
}
