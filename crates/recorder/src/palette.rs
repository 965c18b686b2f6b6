//! CityScapes palette for semantic tags

/// RGB per semantic tag of the vehicle simulator
pub const CITYSCAPES: [[u8; 3]; 23] = [
    [0, 0, 0],       // unlabeled
    [70, 70, 70],    // building
    [100, 40, 40],   // fence
    [55, 90, 80],    // other
    [220, 20, 60],   // pedestrian
    [153, 153, 153], // pole
    [157, 234, 50],  // road line
    [128, 64, 128],  // road
    [244, 35, 232],  // sidewalk
    [107, 142, 35],  // vegetation
    [0, 0, 142],     // vehicle
    [102, 102, 156], // wall
    [220, 220, 0],   // traffic sign
    [70, 130, 180],  // sky
    [81, 0, 81],     // ground
    [150, 100, 100], // bridge
    [230, 150, 140], // rail track
    [180, 165, 180], // guard rail
    [250, 170, 30],  // traffic light
    [110, 190, 160], // static
    [170, 120, 50],  // dynamic
    [45, 60, 150],   // water
    [145, 170, 100], // terrain
];

/// Unknown tags render as unlabeled
pub fn color_of(tag: u32) -> [u8; 3] {
    CITYSCAPES.get(tag as usize).copied().unwrap_or(CITYSCAPES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_tags() {
        assert_eq!(color_of(10), [0, 0, 142]);
        assert_eq!(color_of(7), [128, 64, 128]);
        assert_eq!(color_of(200), [0, 0, 0]);
    }
}
