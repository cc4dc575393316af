//! GPIO pin assignments for the controller board.
//!
//! Locked by the board layout; change only with a hardware revision.

/// Door H-bridge (VNH7100-class).
pub const DOOR_INA_GPIO: i32 = 4;
pub const DOOR_INB_GPIO: i32 = 5;
pub const DOOR_EN_GPIO: i32 = 6;

/// Lock H-bridge.
pub const LOCK_INA_GPIO: i32 = 7;
pub const LOCK_INB_GPIO: i32 = 15;
pub const LOCK_EN_GPIO: i32 = 16;

/// Latching relay coils.
pub const RELAY1_SET_GPIO: i32 = 17;
pub const RELAY1_RESET_GPIO: i32 = 18;
pub const RELAY2_SET_GPIO: i32 = 8;
pub const RELAY2_RESET_GPIO: i32 = 3;

/// Bi-color LED driver inputs.
pub const LED_RED_GPIO: i32 = 9;
pub const LED_GREEN_GPIO: i32 = 10;

/// Inputs. RTC INT has an external pull-up (open-drain line); the door
/// switch uses the internal pull-up; the config slide switch is read
/// directly.
pub const RTC_INT_GPIO: i32 = 1;
pub const DOOR_SW_GPIO: i32 = 2;
pub const CONFIG_SW_GPIO: i32 = 21;

/// I²C bus to the DS3231.
pub const I2C_SDA_GPIO: i32 = 11;
pub const I2C_SCL_GPIO: i32 = 12;
