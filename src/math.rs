use glam::{Mat3, Quat, Vec3};

pub const EPSILON: f32 = 1.0e-6;

/// Unit direction from `from` to `to`, or `None` when the two points coincide.
pub fn direction_to(from: Vec3, to: Vec3) -> Option<Vec3> {
    let delta = to - from;
    let len_sq = delta.length_squared();
    if len_sq <= EPSILON || !len_sq.is_finite() {
        return None;
    }
    Some(delta / len_sq.sqrt())
}

pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq <= EPSILON || !len_sq.is_finite() {
        return fallback;
    }
    v / len_sq.sqrt()
}

pub fn normalize_or_zero(v: Vec3) -> Vec3 {
    normalize_or(v, Vec3::ZERO)
}

pub fn limit_magnitude(v: Vec3, max_magnitude: f32) -> Vec3 {
    if max_magnitude <= 0.0 {
        return Vec3::ZERO;
    }

    let mag_sq = v.length_squared();
    if mag_sq <= max_magnitude * max_magnitude {
        return v;
    }

    v * (max_magnitude / mag_sq.sqrt())
}

/// Unsigned angle in degrees between two directions. Zero-length input
/// yields 0, matching the usual engine convention.
pub fn angle_between_deg(a: Vec3, b: Vec3) -> f32 {
    let denom = (a.length_squared() * b.length_squared()).sqrt();
    if denom <= EPSILON {
        return 0.0;
    }
    let cos = (a.dot(b) / denom).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

pub fn sign_or_one(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Rotation whose local +Z points along `forward` and whose local +Y leans
/// toward `up`. `None` when `forward` is degenerate or parallel to `up`.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let forward = direction_to(Vec3::ZERO, forward)?;
    let right = direction_to(Vec3::ZERO, up.cross(forward))?;
    let up = forward.cross(right);
    let rotation = Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize();
    rotation.is_finite().then_some(rotation)
}

pub fn forward_of(rotation: Quat) -> Vec3 {
    rotation * Vec3::Z
}

pub fn up_of(rotation: Quat) -> Vec3 {
    rotation * Vec3::Y
}

/// Side axis used for line-of-sight steering.
pub fn side_of(forward: Vec3, up: Vec3) -> Vec3 {
    forward.cross(up)
}

pub fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if !value.is_finite() {
        return fallback;
    }
    value.clamp(min, max)
}

pub fn finite_or_zero(v: Vec3) -> Vec3 {
    if v.is_finite() {
        v
    } else {
        Vec3::ZERO
    }
}
