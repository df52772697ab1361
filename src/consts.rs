//! Register addresses, configuration bits and datasheet constants.

/// Texas Instruments manufacturer ID ("TI" in ASCII), shared by all supported chips.
pub const TI_MANUFACTURER_ID: u16 = 0x5449;

/// Default 7-bit I2C address with A0/A1 tied to ground.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x40;

// --- INA219: 12-bit single channel monitor with 16-bit calibration ---
pub mod ina219 {
    pub const REG_CONFIG: u8 = 0x00;
    pub const REG_SHUNT_VOLTAGE: u8 = 0x01;
    pub const REG_BUS_VOLTAGE: u8 = 0x02;
    pub const REG_POWER: u8 = 0x03;
    pub const REG_CURRENT: u8 = 0x04;
    pub const REG_CALIBRATION: u8 = 0x05;

    pub const CONFIG_RESET: u16 = 0x8000;
    /// Bus voltage range bit: clear for 16 V, set for 32 V.
    pub const CONFIG_BRNG_MASK: u16 = 0x2000;
    pub const CONFIG_BRNG_16V: u16 = 0x0000;
    pub const CONFIG_BRNG_32V: u16 = 0x2000;
    pub const CONFIG_GAIN_8_320MV: u16 = 0x1800;
    pub const CONFIG_BADC_12BIT: u16 = 0x0180;
    pub const CONFIG_SADC_12BIT: u16 = 0x0018;
    pub const CONFIG_MODE_SANDBVOLT_CONTINUOUS: u16 = 0x0007;
    /// 32 V bus range, ±320 mV shunt range, 12-bit conversions, continuous.
    pub const DEFAULT_CONFIG: u16 = CONFIG_BRNG_32V
        | CONFIG_GAIN_8_320MV
        | CONFIG_BADC_12BIT
        | CONFIG_SADC_12BIT
        | CONFIG_MODE_SANDBVOLT_CONTINUOUS;

    /// Bus voltage register: math overflow flag (bit 0).
    pub const BUS_OVF: u16 = 1 << 0;
    /// Bus voltage register: conversion ready flag (bit 1).
    pub const BUS_CNVR: u16 = 1 << 1;

    pub const CALIBRATION_K: f64 = 0.04096;
    pub const CALIBRATION_MAX: u32 = 0xFFFE;
    pub const SHUNT_LSB_V: f64 = 10e-6;
    pub const BUS_LSB_V: f64 = 4e-3;
    pub const POWER_LSB_FACTOR: f64 = 20.0;
    pub const RESET_DELAY_MS: u64 = 100;
}

// --- INA228: 20-bit precision monitor with energy and charge accumulators ---
pub mod ina228 {
    pub const REG_CONFIG: u8 = 0x00;
    pub const REG_ADC_CONFIG: u8 = 0x01;
    pub const REG_SHUNT_CAL: u8 = 0x02;
    pub const REG_SHUNT_TEMPCO: u8 = 0x03;
    pub const REG_VSHUNT: u8 = 0x04;
    pub const REG_VBUS: u8 = 0x05;
    pub const REG_DIETEMP: u8 = 0x06;
    pub const REG_CURRENT: u8 = 0x07;
    pub const REG_POWER: u8 = 0x08;
    pub const REG_ENERGY: u8 = 0x09;
    pub const REG_CHARGE: u8 = 0x0A;
    pub const REG_DIAG_ALRT: u8 = 0x0B;
    pub const REG_SOVL: u8 = 0x0C;
    pub const REG_SUVL: u8 = 0x0D;
    pub const REG_BOVL: u8 = 0x0E;
    pub const REG_BUVL: u8 = 0x0F;
    pub const REG_TEMP_LIMIT: u8 = 0x10;
    pub const REG_PWR_LIMIT: u8 = 0x11;
    pub const REG_MANUFACTURER_ID: u8 = 0x3E;
    pub const REG_DEVICE_ID: u8 = 0x3F;

    pub const CONFIG_RESET: u16 = 0x8000;
    pub const CONFIG_RESETACC: u16 = 0x4000;
    /// ADC_RANGE = 1 selects the ±40.96 mV shunt range.
    pub const CONFIG_ADC_RANGE_NARROW: u16 = 0x0010;

    pub const ADC_MODE_CONT_BUS_SHUNT: u16 = 0xB000;
    pub const ADC_VBUSCT_50US: u16 = 0x0000;
    pub const ADC_VSHCT_1052US: u16 = 0x0140;
    pub const ADC_VTCT_1052US: u16 = 0x0028;
    pub const ADC_AVG_1: u16 = 0x0000;
    pub const DEFAULT_ADC_CONFIG: u16 =
        ADC_MODE_CONT_BUS_SHUNT | ADC_VBUSCT_50US | ADC_VSHCT_1052US | ADC_VTCT_1052US | ADC_AVG_1;

    pub const DIAG_ALRT_ALATCH: u16 = 0x8000;
    /// Conversion ready flag.
    pub const DIAG_ALRT_CNVRF: u16 = 0x0002;
    /// Shunt over-voltage limit written at initialization.
    pub const DEFAULT_SOVL: u16 = 0x7FFE;
    /// Bus under-voltage limit written at initialization.
    pub const DEFAULT_BUVL: u16 = 0x0310;

    pub const DEVICE_ID: u16 = 0x2280;
    pub const DEVICE_ID_MASK: u16 = 0xFFF0;

    pub const CALIBRATION_K: f64 = 13107.2e6;
    pub const CALIBRATION_MAX: u32 = 0x7FFF;
    /// SHUNT_CAL is scaled by 4 in the ±40.96 mV range.
    pub const NARROW_RANGE_CAL_SCALE: f64 = 4.0;
    pub const SHUNT_LSB_STANDARD_V: f64 = 312.5e-9;
    pub const SHUNT_LSB_NARROW_V: f64 = 78.125e-9;
    pub const BUS_LSB_V: f64 = 195.3125e-6;
    pub const TEMP_LSB_C: f64 = 7.8125e-3;
    pub const POWER_LSB_FACTOR: f64 = 3.2;
    pub const ENERGY_LSB_FACTOR: f64 = 16.0;

    // Alert limit register resolutions
    pub const SHUNT_LIMIT_LSB_STANDARD_V: f64 = 5e-6;
    pub const SHUNT_LIMIT_LSB_NARROW_V: f64 = 1.25e-6;
    pub const BUS_LIMIT_LSB_V: f64 = 3.125e-3;
    pub const TEMP_LIMIT_LSB_C: f64 = 7.8125e-3;
    /// PWR_LIMIT counts are 256 power LSBs.
    pub const POWER_LIMIT_FACTOR: f64 = 256.0;
    /// 24-bit result registers carry 4 reserved low bits.
    pub const RESULT_SHIFT: u8 = 4;
    pub const RESET_DELAY_MS: u64 = 10;
}

// --- INA3221: three channel shunt and bus voltage monitor, no calibration register ---
pub mod ina3221 {
    pub const REG_CONFIG: u8 = 0x00;
    /// Shunt voltage register of channel 1; channel n is at `0x01 + 2 * (n - 1)`.
    pub const REG_CH1_SHUNT_VOLTAGE: u8 = 0x01;
    /// Bus voltage register of channel 1; channel n is at `0x02 + 2 * (n - 1)`.
    pub const REG_CH1_BUS_VOLTAGE: u8 = 0x02;
    /// Shunt critical alert limit of channel 1; channel n is at `0x07 + 2 * (n - 1)`.
    pub const REG_CH1_CRITICAL_ALERT_LIMIT: u8 = 0x07;
    /// Shunt warning alert limit of channel 1; channel n is at `0x08 + 2 * (n - 1)`.
    pub const REG_CH1_WARNING_ALERT_LIMIT: u8 = 0x08;
    pub const REG_MASK_ENABLE: u8 = 0x0F;
    pub const REG_MANUFACTURER_ID: u8 = 0xFE;
    pub const REG_DIE_ID: u8 = 0xFF;

    pub const CONFIG_RESET: u16 = 0x8000;
    pub const CONFIG_ENABLE_CH1: u16 = 0x4000;
    pub const CONFIG_ENABLE_CH2: u16 = 0x2000;
    pub const CONFIG_ENABLE_CH3: u16 = 0x1000;
    pub const CONFIG_AVG_1: u16 = 0x0000;
    pub const CONFIG_VBUS_CT_1100US: u16 = 0x0100;
    pub const CONFIG_VSH_CT_1100US: u16 = 0x0020;
    pub const CONFIG_MODE_SHUNT_AND_BUS_CONTINUOUS: u16 = 0x0007;
    pub const DEFAULT_CONFIG: u16 = CONFIG_ENABLE_CH1
        | CONFIG_ENABLE_CH2
        | CONFIG_ENABLE_CH3
        | CONFIG_AVG_1
        | CONFIG_VBUS_CT_1100US
        | CONFIG_VSH_CT_1100US
        | CONFIG_MODE_SHUNT_AND_BUS_CONTINUOUS;

    /// Mask/enable register: conversion ready flag.
    pub const MASK_ENABLE_CVRF: u16 = 0x0001;

    pub const DIE_ID: u16 = 0x3220;

    pub const SHUNT_LSB_V: f64 = 40e-6;
    pub const BUS_LSB_V: f64 = 8e-3;
    /// Shunt and bus registers carry 3 unused low bits.
    pub const RESULT_SHIFT: u8 = 3;
    pub const RESET_DELAY_MS: u64 = 100;
}
