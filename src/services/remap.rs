//! Unit coordinate transform between ascending and descending numbering.
//!
//! Both functions work in "lowest occupied unit" terms: an object at
//! `position` with height `h` occupies `position..=position + h - 1`. The
//! remap mirrors that span inside the rack's unit interval, so the same
//! function converts ascending to descending and back again.

/// Returns the top (highest numbered) unit of a rack.
///
/// Saturates at the `i64` bounds for racks whose last label cannot be stored.
#[must_use]
pub fn top_unit(rack_starting_unit: i64, rack_u_height: i64) -> i64 {
    saturate(wide_top(rack_starting_unit, rack_u_height))
}

fn wide_top(rack_starting_unit: i64, rack_u_height: i64) -> i128 {
    i128::from(rack_starting_unit) + i128::from(rack_u_height) - 1
}

fn wide_remap(
    position: i64,
    object_height: i64,
    rack_starting_unit: i64,
    rack_u_height: i64,
) -> i128 {
    wide_top(rack_starting_unit, rack_u_height)
        - (i128::from(position) - i128::from(rack_starting_unit))
        - i128::from(object_height)
        + 1
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Mirrors an occupied span inside the rack's unit interval.
///
/// Callable with any integers. The result is only guaranteed to stay inside
/// the rack when [`is_valid_span`] holds for the same inputs; a mirrored
/// label outside the `i64` range saturates (see [`checked_remap_position`]).
///
/// # Examples
///
/// ```
/// use rack_inverter::services::remap::remap_position;
///
/// // 1U at the top of a 45U rack lands on unit 1.
/// assert_eq!(remap_position(45, 1, 1, 45), 1);
/// // Applying the remap twice is the identity.
/// assert_eq!(remap_position(remap_position(37, 3, 1, 45), 3, 1, 45), 37);
/// ```
#[must_use]
pub fn remap_position(
    position: i64,
    object_height: i64,
    rack_starting_unit: i64,
    rack_u_height: i64,
) -> i64 {
    saturate(wide_remap(
        position,
        object_height,
        rack_starting_unit,
        rack_u_height,
    ))
}

/// Like [`remap_position`], but `None` when the mirrored label does not fit
/// in an `i64`.
#[must_use]
pub fn checked_remap_position(
    position: i64,
    object_height: i64,
    rack_starting_unit: i64,
    rack_u_height: i64,
) -> Option<i64> {
    i64::try_from(wide_remap(
        position,
        object_height,
        rack_starting_unit,
        rack_u_height,
    ))
    .ok()
}

/// Checks that a span fits entirely within the rack's unit interval.
///
/// Degenerate racks (`rack_u_height < 1`) and degenerate objects
/// (`object_height < 1`) are never valid. Bounds are compared exactly, so
/// the check never overflows.
#[must_use]
pub fn is_valid_span(
    position: i64,
    object_height: i64,
    rack_starting_unit: i64,
    rack_u_height: i64,
) -> bool {
    if rack_u_height < 1 || object_height < 1 {
        return false;
    }

    let bottom = i128::from(rack_starting_unit);
    let top = wide_top(rack_starting_unit, rack_u_height);
    let position = i128::from(position);
    let span_top = position + i128::from(object_height) - 1;

    position >= bottom && position <= top && span_top >= bottom && span_top <= top
}
