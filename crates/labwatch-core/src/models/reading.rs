//! Sensor reading data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Side length of the thermal imager grid
pub const THERMAL_GRID_SIZE: usize = 8;

/// Kind of sensor that produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SensorType {
    /// Combined temperature and relative humidity probe
    TempHumidity,
    /// Particulate matter sensor
    AirQuality,
    /// Accelerometer mounted on equipment
    Vibration,
    /// 8x8 infrared thermal imager
    ThermalImager,
    /// Camera-based people counter
    PeopleCount,
}

impl SensorType {
    /// All known sensor types
    pub const ALL: [SensorType; 5] = [
        SensorType::TempHumidity,
        SensorType::AirQuality,
        SensorType::Vibration,
        SensorType::ThermalImager,
        SensorType::PeopleCount,
    ];

    /// Wire name of the sensor type
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::TempHumidity => "tempHumidity",
            SensorType::AirQuality => "airQuality",
            SensorType::Vibration => "vibration",
            SensorType::ThermalImager => "thermalImager",
            SensorType::PeopleCount => "peopleCount",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Status of a reading as classified by the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    /// Every check within normal range
    #[default]
    Normal,
    /// At least one check crossed a high threshold
    Warning,
    /// At least one check crossed a critical threshold
    Critical,
}

/// A single timestamped sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// Sensor that produced the reading
    pub sensor_id: String,

    /// Room the sensor is installed in
    pub room_id: String,

    /// Human-readable room name
    pub room_name: String,

    /// When the reading was taken
    pub timestamp: DateTime<Utc>,

    /// Status set by the evaluator
    #[serde(default)]
    pub status: ReadingStatus,

    /// Sensor-specific values, tagged by `sensorType`
    #[serde(flatten)]
    pub payload: ReadingPayload,
}

impl SensorReading {
    /// Sensor type of the payload, `None` for unrecognized payloads
    pub fn sensor_type(&self) -> Option<SensorType> {
        self.payload.sensor_type()
    }

    /// Copy of the reading carrying the given status
    pub fn with_status(mut self, status: ReadingStatus) -> Self {
        self.status = status;
        self
    }
}

/// Sensor-specific payload of a reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensorType", rename_all = "camelCase")]
pub enum ReadingPayload {
    TempHumidity(TempHumidityReading),
    AirQuality(AirQualityReading),
    Vibration(VibrationReading),
    ThermalImager(ThermalImagerReading),
    PeopleCount(PeopleCountReading),
    /// Any sensor type this build has no model for
    #[serde(other)]
    Unknown,
}

impl ReadingPayload {
    /// Sensor type of the payload
    pub fn sensor_type(&self) -> Option<SensorType> {
        match self {
            ReadingPayload::TempHumidity(_) => Some(SensorType::TempHumidity),
            ReadingPayload::AirQuality(_) => Some(SensorType::AirQuality),
            ReadingPayload::Vibration(_) => Some(SensorType::Vibration),
            ReadingPayload::ThermalImager(_) => Some(SensorType::ThermalImager),
            ReadingPayload::PeopleCount(_) => Some(SensorType::PeopleCount),
            ReadingPayload::Unknown => None,
        }
    }
}

/// Temperature (°C) and relative humidity (%)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempHumidityReading {
    #[serde(default, deserialize_with = "lenient_number")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub humidity: Option<f64>,
}

/// Particulate matter concentrations in µg/m³
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirQualityReading {
    #[serde(default, deserialize_with = "lenient_number")]
    pub pm25: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pm10: Option<f64>,
    /// AQI as reported by the device, if any
    #[serde(
        default,
        deserialize_with = "lenient_index",
        skip_serializing_if = "Option::is_none"
    )]
    pub aqi: Option<u16>,
    /// AQI category as reported by the device, if any
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub level: Option<String>,
}

impl AirQualityReading {
    /// Reported AQI, or the one derived from PM2.5
    pub fn aqi(&self) -> Option<u16> {
        self.aqi.or_else(|| self.pm25.map(aqi_from_pm25))
    }

    /// AQI category derived from [`Self::aqi`]
    pub fn aqi_level(&self) -> Option<AqiLevel> {
        self.aqi().map(AqiLevel::from_aqi)
    }
}

/// RMS acceleration in g
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VibrationReading {
    #[serde(default, deserialize_with = "lenient_number")]
    pub rms_acceleration: Option<f64>,
}

/// Thermal imager frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalImagerReading {
    /// Per-cell temperatures, as 8 rows of 8 or a flat list of 64.
    /// Shape and cells are checked by [`Self::summary`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels: Option<Value>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub min_temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub avg_temp: Option<f64>,
}

/// Min/max/avg over a thermal frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl ThermalImagerReading {
    /// Summary of the frame.
    ///
    /// Reported values win over values derived from the grid. Fails with a
    /// reason when the grid is malformed or when neither source yields a max.
    pub fn summary(&self) -> Result<GridSummary, String> {
        let derived = match &self.pixels {
            Some(grid) => Some(summarize_grid(grid)?),
            None => None,
        };

        let max = self
            .max_temp
            .or(derived.map(|d| d.max))
            .ok_or_else(|| "maxTemp is missing and no pixel grid was supplied".to_string())?;

        Ok(GridSummary {
            min: self.min_temp.or(derived.map(|d| d.min)).unwrap_or(max),
            max,
            avg: self.avg_temp.or(derived.map(|d| d.avg)).unwrap_or(max),
        })
    }
}

fn summarize_grid(grid: &Value) -> Result<GridSummary, String> {
    let cells = grid_cells(grid)?;

    let min = cells.iter().copied().fold(f64::INFINITY, f64::min);
    let max = cells.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = cells.iter().sum::<f64>() / cells.len() as f64;

    Ok(GridSummary { min, max, avg })
}

/// Cells of a frame in row-major order.
///
/// A frame is either `THERMAL_GRID_SIZE` rows of `THERMAL_GRID_SIZE` cells or
/// one flat list of all cells. Every cell must be a finite number.
fn grid_cells(grid: &Value) -> Result<Vec<f64>, String> {
    let Some(items) = grid.as_array() else {
        return Err("pixel grid must be an array".to_string());
    };

    let cells: Vec<&Value> = if !items.is_empty() && items.iter().all(Value::is_array) {
        let rows: Vec<&Vec<Value>> = items.iter().filter_map(Value::as_array).collect();
        if rows.len() != THERMAL_GRID_SIZE || rows.iter().any(|row| row.len() != THERMAL_GRID_SIZE)
        {
            return Err(format!(
                "pixel grid must be {THERMAL_GRID_SIZE}x{THERMAL_GRID_SIZE}"
            ));
        }
        rows.into_iter().flatten().collect()
    } else {
        if items.len() != THERMAL_GRID_SIZE * THERMAL_GRID_SIZE {
            return Err(format!(
                "pixel grid must hold {} cells, got {}",
                THERMAL_GRID_SIZE * THERMAL_GRID_SIZE,
                items.len()
            ));
        }
        items.iter().collect()
    };

    cells
        .into_iter()
        .enumerate()
        .map(|(i, cell)| {
            numeric(cell).ok_or_else(|| format!("pixel cell {i} is not a finite number"))
        })
        .collect()
}

/// Number of people detected in a room
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeopleCountReading {
    #[serde(default, deserialize_with = "lenient_number")]
    pub count: Option<f64>,
    /// Detector confidence in [0, 1]
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
}

/// US EPA AQI category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiLevel {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiLevel {
    /// Category for an AQI value
    pub fn from_aqi(aqi: u16) -> Self {
        match aqi {
            0..=50 => AqiLevel::Good,
            51..=100 => AqiLevel::Moderate,
            101..=150 => AqiLevel::UnhealthyForSensitiveGroups,
            151..=200 => AqiLevel::Unhealthy,
            201..=300 => AqiLevel::VeryUnhealthy,
            _ => AqiLevel::Hazardous,
        }
    }
}

// (concentration low, concentration high, index low, index high)
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 6] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 500.4, 301.0, 500.0),
];

/// US EPA AQI for a PM2.5 concentration (µg/m³, truncated to 0.1)
pub fn aqi_from_pm25(pm25: f64) -> u16 {
    let c = (pm25.max(0.0) * 10.0).floor() / 10.0;

    for (c_lo, c_hi, i_lo, i_hi) in PM25_BREAKPOINTS {
        if c <= c_hi {
            let index = (i_hi - i_lo) / (c_hi - c_lo) * (c - c_lo) + i_lo;
            return index.round() as u16;
        }
    }

    500
}

/// Finite number from a JSON number or numeric string
fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// Accepts JSON numbers and numeric strings; anything else reads as missing.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(numeric))
}

/// Like [`lenient_number`], rounded to an index; out-of-range values read as missing.
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?
        .map(f64::round)
        .filter(|v| (0.0..=f64::from(u16::MAX)).contains(v))
        .map(|v| v as u16))
}

/// Strings pass through; any other JSON value reads as missing.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}
